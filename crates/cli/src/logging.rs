use log::LevelFilter;

/// Installs a stderr logger. Call once at the start of `main()`.
pub fn init_logger(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    let result = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}  {} {}",
                chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                record.level(),
                message
            ));
        })
        .level(level)
        .chain(std::io::stderr())
        .apply();

    if let Err(err) = result {
        log::warn!("Logger already initialized: {err}");
    }
}
