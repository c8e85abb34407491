use std::process::ExitCode;

fn main() -> ExitCode {
    match maple_chess::uci::run_stdio_loop() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fatal: {err}");
            ExitCode::FAILURE
        }
    }
}
