//! `do_nothing`: lets the model decline a request explicitly.

use async_trait::async_trait;
use steward_core::error::FunctionError;
use steward_core::function::{FunctionArgs, FunctionHandler, FunctionSpec};
use steward_core::reply::CallerContext;

pub fn spec() -> FunctionSpec {
    FunctionSpec::new(
        "do_nothing",
        "Do nothing. This is not an ability, just a way to let you refuse",
    )
}

pub struct DoNothing;

#[async_trait]
impl FunctionHandler for DoNothing {
    async fn call(
        &self,
        _ctx: &dyn CallerContext,
        _args: FunctionArgs,
    ) -> Result<Option<String>, FunctionError> {
        Ok(Some("Success".into()))
    }
}
