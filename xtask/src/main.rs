/// Packages the plugin through nih_plug_xtask's `bundle` subcommand:
///
///   cargo xtask bundle expressive-delay --release
///
/// The bundles land in `target/bundled/Expressive Delay.{vst3,clap}`.
fn main() -> nih_plug_xtask::Result<()> {
    nih_plug_xtask::main()
}
