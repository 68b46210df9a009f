fn main() {
    let cli = depquery::cli::parse();
    depquery::utils::logging::init(cli.verbose);
    let code = depquery::app::run_cli(cli);
    if code != 0 {
        std::process::exit(code);
    }
}
