pub mod config;
pub mod ctx;
pub mod ops;

use ctx::LogCtx;

pub fn watch() -> LogCtx<ops::watch::Watch> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
pub fn control() -> LogCtx<ops::control::Control> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
pub fn status() -> LogCtx<ops::status::Status> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
pub fn progress() -> LogCtx<ops::progress::Progress> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
