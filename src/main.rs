fn main() -> anyhow::Result<()> {
    mindspace_lib::run()
}
