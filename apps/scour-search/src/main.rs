use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = scour_search::Args::parse();

	scour_search::run(args).await
}
