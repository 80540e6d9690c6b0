use std::fmt;

/// Log category, printed as a `[Category]` prefix on every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Setup,
    Config,
    Storage,
    Ipc,
    Catalog,
    SpeedTest,
    AutoSwitch,
    Traffic,
    Timer,
    Cmd,
    Server,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Setup => "Setup",
            Type::Config => "Config",
            Type::Storage => "Storage",
            Type::Ipc => "Ipc",
            Type::Catalog => "Catalog",
            Type::SpeedTest => "SpeedTest",
            Type::AutoSwitch => "AutoSwitch",
            Type::Traffic => "Traffic",
            Type::Timer => "Timer",
            Type::Cmd => "Cmd",
            Type::Server => "Server",
        };
        write!(f, "[{name}]")
    }
}

/// `logging!(level, Type::X, [print,] fmt, args...)`
///
/// With `true` as the third argument the record is echoed to stdout as well,
/// which the daemon uses for start-up diagnostics.
#[macro_export]
macro_rules! logging {
    ($level:ident, $type:expr, true, $($arg:tt)*) => {{
        println!("{} {}", $type, format_args!($($arg)*));
        log::$level!(target: "app", "{} {}", $type, format_args!($($arg)*));
    }};
    ($level:ident, $type:expr, false, $($arg:tt)*) => {{
        log::$level!(target: "app", "{} {}", $type, format_args!($($arg)*));
    }};
    ($level:ident, $type:expr, $($arg:tt)*) => {{
        log::$level!(target: "app", "{} {}", $type, format_args!($($arg)*));
    }};
}

/// Logs at error level; the first form takes a `Result` and logs its `Err`.
#[macro_export]
macro_rules! logging_error {
    ($type:expr, result => $result:expr) => {{
        if let Err(err) = $result {
            log::error!(target: "app", "{} {}", $type, err);
        }
    }};
    ($type:expr, true, $($arg:tt)*) => {{
        eprintln!("{} {}", $type, format_args!($($arg)*));
        log::error!(target: "app", "{} {}", $type, format_args!($($arg)*));
    }};
    ($type:expr, false, $($arg:tt)*) => {{
        log::error!(target: "app", "{} {}", $type, format_args!($($arg)*));
    }};
    ($type:expr, $($arg:tt)*) => {{
        log::error!(target: "app", "{} {}", $type, format_args!($($arg)*));
    }};
}
