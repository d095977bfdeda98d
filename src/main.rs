fn main() {
    #[cfg(feature = "cli")]
    windelta::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("windelta: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
