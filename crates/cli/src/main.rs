use std::process::ExitCode;

fn main() -> ExitCode {
    rollout_cli::run()
}
