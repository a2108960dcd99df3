//! Energy trace file: one `iter  energy Tr(S*D)= trace` line per iteration

use crate::scf_impl::EnergyTrace;
use color_eyre::eyre::{Result, WrapErr};
use std::fs::File;
use std::io::{BufWriter, Write};

pub fn write_energy_trace<W: Write>(writer: &mut W, trace: &EnergyTrace) -> Result<()> {
    for record in trace.records() {
        writeln!(
            writer,
            "{}  {:.10} Tr(S*D)= {:.10}",
            record.iteration, record.energy, record.trace
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Write `trace` to `path`, replacing any existing file.
pub fn save_energy_trace(path: &str, trace: &EnergyTrace) -> Result<()> {
    let file =
        File::create(path).wrap_err_with(|| format!("Unable to create energy trace file: {}", path))?;
    let mut writer = BufWriter::new(file);
    write_energy_trace(&mut writer, trace)
        .wrap_err_with(|| format!("Unable to write energy trace file: {}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scf_impl::TraceRecord;

    #[test]
    fn test_trace_line_format() {
        let mut trace = EnergyTrace::default();
        trace.push(TraceRecord {
            iteration: 0,
            energy: -1.5,
            trace: 2.0,
        });
        trace.push(TraceRecord {
            iteration: 1,
            energy: -1.83101,
            trace: 1.9999999999,
        });

        let mut buffer = Vec::new();
        write_energy_trace(&mut buffer, &trace).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "0  -1.5000000000 Tr(S*D)= 2.0000000000");
        assert_eq!(lines[1], "1  -1.8310100000 Tr(S*D)= 1.9999999999");
    }

    #[test]
    fn test_empty_trace_writes_nothing() {
        let mut buffer = Vec::new();
        write_energy_trace(&mut buffer, &EnergyTrace::default()).unwrap();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_save_to_missing_directory_fails() {
        let result = save_energy_trace("/nonexistent-dir/energy.txt", &EnergyTrace::default());
        assert!(result.is_err());
    }
}
