#![allow(async_fn_in_trait)]

pub mod client;
pub mod config;
pub mod entities;
pub mod error;
pub mod http;
pub mod service;
pub mod storage;
