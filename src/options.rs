use log::warn;

const OPTION_PREFIX: &str = "--option.";

/// A `setoption name <name> value <value>` pair forwarded verbatim to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UciOption {
    pub name: String,
    pub value: String,
}

impl UciOption {
    /// Parses `--option.Name=Value`; the value is everything after the first `=`.
    pub fn from_arg(arg: &str) -> Option<Self> {
        let (name, value) = arg.strip_prefix(OPTION_PREFIX)?.split_once('=')?;
        if name.is_empty() { return None; }
        Some(Self { name: name.to_string(), value: value.to_string() })
    }
}

/// Pulls `--option.*` flags out of argv. Option names are free-form, so they
/// can't be declared to clap; everything else is returned for clap to parse.
pub fn split_option_args<I>(args: I) -> (Vec<String>, Vec<UciOption>)
where
    I: IntoIterator<Item = String>,
{
    let mut rest = Vec::new();
    let mut options = Vec::new();
    for arg in args {
        if !arg.starts_with(OPTION_PREFIX) {
            rest.push(arg);
            continue;
        }
        match UciOption::from_arg(&arg) {
            Some(opt) => options.push(opt),
            None => warn!("ignoring malformed engine option '{}', expected --option.Name=Value", arg),
        }
    }
    (rest, options)
}
