use std::process::ExitCode;

fn main() -> ExitCode {
    match meadow_lib::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("meadow: {err:#}");
            ExitCode::FAILURE
        }
    }
}
