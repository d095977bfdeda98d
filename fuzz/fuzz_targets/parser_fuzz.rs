#![no_main]
use libfuzzer_sys::fuzz_target;

const SUBCOMMANDS: [&str; 3] = ["decode", "inspect", "config"];

fuzz_target!(|data: &[u8]| {
    let Some((&pick, rest)) = data.split_first() else {
        return;
    };
    // First byte selects the subcommand; NUL-separated arguments follow.
    let mut args = vec![SUBCOMMANDS[usize::from(pick) % SUBCOMMANDS.len()].to_string()];
    args.extend(
        rest.split(|&b| b == 0)
            .take(32)
            .map(|arg| String::from_utf8_lossy(arg).into_owned()),
    );
    windelta::cli::fuzz_try_parse_args(&args);
});
