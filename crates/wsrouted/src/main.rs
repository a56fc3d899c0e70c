use std::process::ExitCode;

fn main() -> ExitCode {
    match wsrouted::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("wsrouted: {error}");
            ExitCode::FAILURE
        }
    }
}
