use clap::Parser;
use facesrec_server::ServerConfig;
use std::error::Error;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[clap(flatten)]
    server: ServerConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    facesrec_server::logging::init(&cli.server.log_level);
    facesrec_server::run(cli.server).await
}
