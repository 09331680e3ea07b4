use std::panic;

/// Readable backtraces in debug builds, a crash report file in release builds.
/// Either way the panic is logged and the log flushed before the process exits.
pub fn initialize_panic_handler() {
    #[cfg(debug_assertions)]
    better_panic::install();
    #[cfg(not(debug_assertions))]
    human_panic::setup_panic!();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        log::error!("{panic_info}");
        log::logger().flush();

        default_hook(panic_info);

        std::process::exit(1);
    }));
}
