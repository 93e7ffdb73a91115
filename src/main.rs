fn main() -> anyhow::Result<()> {
    signcap_lib::run()
}
