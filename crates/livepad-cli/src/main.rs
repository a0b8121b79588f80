use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = livepad_cli::Cli::parse();
    livepad_cli::setup_tracing(cli.verbose);
    if let Err(err) = livepad_cli::run(cli).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
