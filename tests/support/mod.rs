#![allow(dead_code)]

pub mod assertions;
pub mod builders;
pub mod sse;
