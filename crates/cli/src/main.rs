use std::process::ExitCode;

fn main() -> ExitCode {
    raterbot_cli::run()
}
