use clap::Parser;

use roost_worker::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = Args::parse();

	roost_worker::run(args).await
}
