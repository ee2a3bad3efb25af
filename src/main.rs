// src/main.rs

use rundag::{cli, logging, supervise};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("rundag error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<i32> {
    let args = cli::parse();
    logging::init_logging(args.logging.log_level)?;
    let outcome = supervise(args).await?;
    Ok(outcome.exit_code)
}
