use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = scour_worker::Args::parse();

	scour_worker::run(args).await
}
