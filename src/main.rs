fn main() -> anyhow::Result<()> {
    tb_scanner_lib::run()
}
