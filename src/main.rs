//! # Command Line Interface
//!
//! Dispatch commands to `commands` module.

use env_logger;
#[cfg(windows)]
use colored;
use hexkit::commands;
use hexkit::commands::CommandError;
mod cli;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).unwrap();

    let main_cmd = cli::build_cli();
    let matches = main_cmd.get_matches();

    let result = match matches.subcommand() {
        Some(("completions",cmd)) => commands::completions::generate(cli::build_cli(),cmd),
        Some(("convert",cmd)) => commands::convert::convert(cmd),
        Some(("merge",cmd)) => commands::merge::merge(cmd),
        Some(("crop",cmd)) => commands::edit::crop(cmd),
        Some(("cut",cmd)) => commands::edit::cut(cmd),
        Some(("clear",cmd)) => commands::edit::clear(cmd),
        Some(("delete",cmd)) => commands::edit::delete(cmd),
        Some(("fill",cmd)) => commands::edit::fill(cmd),
        Some(("flood",cmd)) => commands::edit::flood(cmd),
        Some(("shift",cmd)) => commands::edit::shift(cmd),
        Some(("align",cmd)) => commands::edit::align(cmd),
        Some(("find",cmd)) => commands::edit::find(cmd),
        Some(("split",cmd)) => commands::split::split(cmd),
        Some(("validate",cmd)) => commands::validate::validate(cmd),
        Some(("print",cmd)) => commands::print::print(cmd),
        Some(("xxd",cmd)) => commands::print::xxd(cmd),
        Some(("hexdump",cmd)) => commands::print::hexdump(cmd),
        _ => {
            log::error!("No subcommand was found, try `hexkit --help`");
            Err(Box::new(CommandError::InvalidCommand) as Box<dyn std::error::Error>)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}",e);
        std::process::exit(exit_code(&e));
    }
}

/// 1 for usage errors, 2 for I/O, 3 for parse or validation problems
fn exit_code(e: &Box<dyn std::error::Error>) -> i32 {
    if e.downcast_ref::<hexkit::rec::Error>().is_some() {
        return 3;
    }
    if e.downcast_ref::<hexkit::mem::Error>().is_some() {
        return 3;
    }
    if e.downcast_ref::<std::io::Error>().is_some() {
        return 2;
    }
    1
}
