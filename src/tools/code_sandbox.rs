use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::tools::registry::Tool;
use crate::tools::sandbox::{CodeExecutor, format_output};

pub const CODE_SANDBOX: &str = "code_sandbox";

const DESCRIPTION: &str = "Run Python code in a sandbox and return what it prints. \
State such as files written to the working directory is kept between runs in the same \
conversation. Input is the source code.";

/// The `code_sandbox` tool: forwards code to a [`CodeExecutor`].
pub struct CodeSandbox {
    executor: Arc<dyn CodeExecutor>,
}

impl CodeSandbox {
    pub fn new(executor: Arc<dyn CodeExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for CodeSandbox {
    fn name(&self) -> &str {
        CODE_SANDBOX
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    async fn run(&self, session: &str, input: &str) -> String {
        let code = strip_code_fence(input);
        match self.executor.execute(session, code).await {
            Ok(result) => format_output(&result),
            Err(e) => {
                warn!(error = %e, "code_sandbox.failed");
                format!("error: {e}")
            }
        }
    }
}

/// Models sometimes wrap the code in a ```python fence inside tool_input.
fn strip_code_fence(input: &str) -> &str {
    let trimmed = input.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return input;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return input;
    };
    match body.split_once('\n') {
        Some((_lang, code)) => code,
        None => body,
    }
}
