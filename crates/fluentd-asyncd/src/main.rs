use std::process::ExitCode;

fn main() -> ExitCode {
    match fluentd_asyncd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("fluentd-asyncd: {error}");
            ExitCode::FAILURE
        }
    }
}
