//! Conversation starter for uploaded datasets.
//!
//! When a user uploads a file, the fixed tape receives the upload, a system
//! message with the first analysis step, its sandbox output, and a note that
//! steers the model towards continuing in the sandbox. These messages stay in
//! every later memory window.

use std::path::Path;

use tracing::{info, instrument};

use crate::core::error::{Result, SandchatError};
use crate::core::output_parser::{self, AgentStep};
use crate::core::schemas::{FileRef, MessageContent};
use crate::tape::history::SessionHistory;
use crate::tape::store::{Role, StoredMessage};
use crate::tools::code_sandbox::CODE_SANDBOX;
use crate::tools::registry::ToolRegistry;

const TOOL_NOTE: &str = "Take a deep breath and continue analyzing in code_sandbox.\n\
NOTE: The user is not allowed to use these tools. Instead, you should use them for the user. \
If the tool result is KeyError, please check df.head() through the tool, adjust the code and \
try again.";

#[derive(Debug, Clone, PartialEq)]
pub struct OpeningRemarks {
    /// System message describing the initial step.
    pub context: String,
    pub tool_name: String,
    pub tool_output: String,
}

/// pandas reader call for the file's extension.
pub fn reader_call(path: &str) -> Result<String> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let literal = serde_json::to_string(path)?;
    let call = match ext.as_str() {
        "csv" => format!("pd.read_csv({literal}, nrows=10)"),
        "json" => format!("pd.read_json({literal}, nrows=10)"),
        "xls" | "xlsx" => format!("pd.read_excel({literal}, nrows=10)"),
        _ => {
            return Err(SandchatError::BadRequest(format!(
                "unsupported file type: {path}"
            )));
        }
    };
    Ok(call)
}

/// System message text announcing the upload and the first action.
pub fn opening_context(path: &str) -> Result<String> {
    let code = format!(
        "import pandas as pd\n\ndf = {}\nprint(df.head())\n",
        reader_call(path)?
    );
    Ok(format!(
        "The user just uploaded a dataset:{path}, and here's the initial step I did for you:\n{}",
        output_parser::format_action(CODE_SANDBOX, &code)
    ))
}

/// Record an upload and run the first analysis step.
///
/// Unsupported files are rejected before anything is written.
#[instrument(skip_all, fields(session = %history.key(), file = %file.filename))]
pub async fn start(
    history: &mut SessionHistory,
    registry: &ToolRegistry,
    message_id: &str,
    file: &FileRef,
) -> Result<OpeningRemarks> {
    let context = opening_context(&file.path)?;

    let AgentStep::Action(action) = output_parser::parse(&context)? else {
        return Err(SandchatError::OutputParse(
            "opening remarks must contain an action".to_string(),
        ));
    };
    let tool = registry
        .get(&action.tool_name)
        .ok_or_else(|| SandchatError::Config(format!("tool {} is not registered", action.tool_name)))?;

    history.add_fixed_message(
        StoredMessage::new(Role::Human, MessageContent::File(file.clone())).with_id(message_id),
    )?;
    history.add_fixed_message(StoredMessage::new(Role::System, context.as_str()))?;

    let output = tool.run(history.key(), &action.tool_input).await;
    info!(tool = %action.tool_name, output_len = output.len(), "opening_remarks.tool_result");

    history.add_fixed_message(StoredMessage::new(
        Role::Tool,
        format!("{}\n{output}", action.tool_name),
    ))?;
    history.add_fixed_message(StoredMessage::new(Role::System, TOOL_NOTE))?;

    Ok(OpeningRemarks {
        context,
        tool_name: action.tool_name,
        tool_output: output,
    })
}
