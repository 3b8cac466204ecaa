use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match w3f_harness::cli::run_cli().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
