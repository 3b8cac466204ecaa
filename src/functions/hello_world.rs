use crate::context::ExecutionContext;
use crate::runtime::module::Web3Function;
use crate::runtime::outcome::ExecutionResult;
use tracing::info;

pub const NAME: &str = "hello-world";

pub fn register(w3f: &mut Web3Function) {
    w3f.on_run(run);
}

/// Always executable, with nothing to call.
async fn run(ctx: ExecutionContext) -> anyhow::Result<ExecutionResult> {
    info!(chain_id = ctx.gelato_args.chain_id, "hello world");
    Ok(ExecutionResult::exec_multi(Vec::new()))
}
