fn main() -> anyhow::Result<()> {
    bfq::run()
}
