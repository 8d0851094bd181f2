fn main() -> anyhow::Result<()> {
    bfq::run_manager()
}
