use evlog::Logger;
use once_cell::sync::OnceCell;

static LOGGER: OnceCell<Logger> = OnceCell::new();

pub fn set_logger(logger: Logger) {
    if LOGGER.set(logger).is_err() {
        panic!("logger has already been initialized");
    }
}

pub fn get_logger() -> &'static Logger {
    LOGGER.get().expect("logger has not been initialized")
}
