fn main() {
    #[cfg(feature = "cli")]
    pipezip::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("pipezip: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
