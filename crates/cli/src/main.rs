use std::process::ExitCode;

fn main() -> ExitCode {
    diplomas_cli::run()
}
