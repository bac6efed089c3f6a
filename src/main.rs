//! mediacat CLI binary: all logic lives in the library; main.rs only
//! invokes `cli::run()` and maps the result to a process exit code.

fn main() -> std::process::ExitCode {
    mediacat::cli::run()
}
