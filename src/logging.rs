// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Logging setup. Embedders of this crate are free to install their own
//! `log` backend instead; this is a convenience for binaries that just
//! want sensible defaults.

use fern::colors::{Color, ColoredLevelConfig};

/// Install a colored, timestamped `fern` dispatcher at the given level.
/// Calling this more than once per process will return an error from the
/// underlying `log` crate; callers that might be embedded in a larger
/// binary should prefer to set up logging themselves.
pub fn init_logging(level: log::LevelFilter) -> Result<(), fern::InitError> {
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red)
        .debug(Color::Blue)
        .trace(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}
