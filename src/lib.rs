#![allow(dead_code)]
#[macro_use]
pub mod errors;
pub mod storage;
