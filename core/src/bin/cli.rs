/// CLI for a running walletfeed daemon
fn main() -> anyhow::Result<()> {
    walletfeed_core::cli_app::run(std::env::args().collect())
}
