use clap::{arg,crate_version,Arg,Command,ValueHint};

const FMT_NAMES: [&str;12] = [
    "ihex","hex","srec","mot","titxt","tek","xtek","mos","ascii","avr","bin","raw",
];
const ADDR_HELP: &str = "addresses and sizes accept decimal or 0x/0o/0b prefixes";

fn input_arg() -> Arg {
    arg!([input] "input record file, `-` or omitted reads stdin").value_hint(ValueHint::FilePath)
}

fn dest_arg() -> Arg {
    Arg::new("dest")
        .short('d')
        .long("dest")
        .value_name("PATH")
        .help("output path, `-` or omitted writes stdout")
        .value_hint(ValueHint::FilePath)
}

fn iformat_arg() -> Arg {
    Arg::new("iformat")
        .short('i')
        .long("input-format")
        .value_name("FORMAT")
        .help("input format, detected when omitted")
        .value_parser(FMT_NAMES)
}

fn oformat_arg() -> Arg {
    Arg::new("oformat")
        .short('o')
        .long("output-format")
        .value_name("FORMAT")
        .help("output format, defaults to the input format")
        .value_parser(FMT_NAMES)
}

fn start_arg() -> Arg {
    Arg::new("start")
        .short('s')
        .long("start")
        .value_name("ADDR")
        .help("start of the address range")
}

fn end_arg() -> Arg {
    Arg::new("end")
        .short('e')
        .long("end")
        .value_name("ADDR")
        .help("end of the address range, exclusive")
}

fn value_arg(help: &'static str) -> Arg {
    Arg::new("value")
        .short('v')
        .long("value")
        .value_name("VALUE")
        .help(help)
}

pub fn build_cli() -> Command {
    let long_help = "hexkit is always invoked with exactly one of several subcommands.
The subcommands are generally designed to function as nodes in a pipeline.
Set RUST_LOG environment variable to control logging level.
  levels: trace,debug,info,warn,error

Examples:
---------
convert IHEX to SREC:  `hexkit convert fw.hex -o srec -d fw.srec`
merge two images:      `hexkit merge boot.hex app.hex -o ihex -d fw.hex`
fill a range:          `hexkit fill fw.hex -s 0x1000 -e 0x2000 -v FF -d out.hex`
inspect from a pipe:   `hexkit convert fw.bin -o titxt | hexkit print`";

    let mut main_cmd = Command::new("hexkit")
        .about("Loads, edits, converts, and writes firmware record files.")
        .after_long_help(long_help)
        .version(crate_version!());

    main_cmd = main_cmd.subcommand(
        Command::new("convert")
            .arg(input_arg())
            .arg(dest_arg())
            .arg(iformat_arg())
            .arg(oformat_arg())
            .arg(start_arg())
            .arg(end_arg())
            .after_help(ADDR_HELP)
            .about("re-express a record file in another format, optionally cropped"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("merge")
            .arg(arg!(<inputs> ... "input record files, later ones win").value_hint(ValueHint::FilePath))
            .arg(dest_arg())
            .arg(oformat_arg())
            .about("merge record files into one image"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("crop")
            .arg(input_arg())
            .arg(dest_arg())
            .arg(iformat_arg())
            .arg(oformat_arg())
            .arg(start_arg().required(true))
            .arg(end_arg().required(true))
            .after_help(ADDR_HELP)
            .about("keep the range, discard the rest, bound the image to it"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("cut")
            .arg(input_arg())
            .arg(dest_arg())
            .arg(iformat_arg())
            .arg(oformat_arg())
            .arg(start_arg().required(true))
            .arg(end_arg().required(true))
            .after_help(ADDR_HELP)
            .about("keep only the range, without bounding the image"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("clear")
            .arg(input_arg())
            .arg(dest_arg())
            .arg(iformat_arg())
            .arg(oformat_arg())
            .arg(start_arg().required(true))
            .arg(end_arg().required(true))
            .after_help(ADDR_HELP)
            .about("hole the range, leaving other addresses in place"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("delete")
            .arg(input_arg())
            .arg(dest_arg())
            .arg(iformat_arg())
            .arg(oformat_arg())
            .arg(start_arg().required(true))
            .arg(end_arg().required(true))
            .visible_alias("del")
            .after_help(ADDR_HELP)
            .about("remove the range and shift higher addresses down"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("fill")
            .arg(input_arg())
            .arg(dest_arg())
            .arg(iformat_arg())
            .arg(oformat_arg())
            .arg(start_arg().required(true))
            .arg(end_arg().required(true))
            .arg(value_arg("byte pattern in hex, repeated over the range").required(true))
            .after_help(ADDR_HELP)
            .about("populate the range with a pattern, overwriting data"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("flood")
            .arg(input_arg())
            .arg(dest_arg())
            .arg(iformat_arg())
            .arg(oformat_arg())
            .arg(start_arg().required(true))
            .arg(end_arg().required(true))
            .arg(value_arg("byte pattern in hex, repeated over the holes").required(true))
            .after_help(ADDR_HELP)
            .about("fill only the holes in the range with a pattern"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("shift")
            .arg(input_arg())
            .arg(dest_arg())
            .arg(iformat_arg())
            .arg(oformat_arg())
            .arg(value_arg("signed displacement to add to every address").required(true))
            .after_help(ADDR_HELP)
            .about("translate the whole image up or down"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("align")
            .arg(input_arg())
            .arg(dest_arg())
            .arg(iformat_arg())
            .arg(oformat_arg())
            .arg(value_arg("alignment base").required(true))
            .arg(
                Arg::new("fill")
                    .long("fill")
                    .value_name("BYTE")
                    .help("padding byte, defaults to 00"),
            )
            .after_help(ADDR_HELP)
            .about("pad block edges out to multiples of a base"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("find")
            .arg(input_arg())
            .arg(iformat_arg())
            .arg(start_arg())
            .arg(end_arg())
            .arg(value_arg("byte pattern in hex to look for").required(true))
            .after_help(ADDR_HELP)
            .about("print the address of the first match of a byte pattern"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("split")
            .arg(input_arg())
            .arg(dest_arg().required(true))
            .arg(iformat_arg())
            .arg(oformat_arg())
            .arg(value_arg("piece size, a divisor of the address space").required(true))
            .after_help(ADDR_HELP)
            .about("cut the image at size boundaries into numbered files"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("validate")
            .arg(input_arg())
            .arg(iformat_arg())
            .about("report every record level problem in a file"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("print")
            .arg(input_arg())
            .arg(iformat_arg())
            .arg(start_arg())
            .arg(end_arg())
            .after_help(ADDR_HELP)
            .about("display the image as an address/hex/ascii table"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("xxd")
            .arg(input_arg())
            .arg(iformat_arg())
            .arg(start_arg())
            .arg(end_arg())
            .after_help(ADDR_HELP)
            .about("display the image the way xxd would"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("hexdump")
            .arg(input_arg())
            .arg(iformat_arg())
            .arg(start_arg())
            .arg(end_arg())
            .after_help(ADDR_HELP)
            .about("display the image the way hexdump -C would"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("completions")
            .arg(
                arg!(-s --shell <SHELL> "shell to generate completions for")
                    .value_parser(["bash","elv","fish","ps1","zsh"])
                    .required(true),
            )
            .about("write shell completions to stdout"),
    );
    main_cmd
}
