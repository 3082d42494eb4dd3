use dcc::driver::{self, Cli, DriverEnv};
use dcc::logger;
use std::process::exit;

/// The main entry point for the application.
///
/// Captures the raw arguments, resolves them and runs the driver.
fn main() {
    let cli = Cli::capture();
    let env = DriverEnv::from_env();
    logger::init(env.debug);

    let code = match cli
        .into_resolution(&env)
        .and_then(|resolution| driver::dispatch(resolution, &env, &mut std::io::stdout()))
    {
        Ok(code) => code,
        Err(e) => {
            eprintln!("dcc: {e}");
            e.exit_code()
        }
    };
    exit(code);
}
