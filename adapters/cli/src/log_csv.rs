//! Loader for the simulator's CSV event log.
//!
//! Only four columns are read: the hour offset (column 0), the agent id
//! (column 1), the location name (column 6) and the optional `"lat,lon"`
//! geo pair (column 10). Rows with fewer columns or unparsable ids are
//! skipped.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result};
use route_replay_core::{AgentId, Coordinate, Hour, LocationId};
use route_replay_world::ObservationRecord;
use tracing::{debug, info};

const MIN_COLUMNS: usize = 11;
const HOUR_COLUMN: usize = 0;
const AGENT_COLUMN: usize = 1;
const LOCATION_COLUMN: usize = 6;
const GEO_COLUMN: usize = 10;

/// Rows and coordinates extracted from a log file.
#[derive(Debug, Default)]
pub(crate) struct LoadedLog {
    pub(crate) records: Vec<ObservationRecord>,
    pub(crate) coordinates: BTreeMap<LocationId, Coordinate>,
    pub(crate) skipped: usize,
}

/// Opens and parses the log stored at `path`.
pub(crate) fn read(path: &Path) -> Result<LoadedLog> {
    let file =
        File::open(path).with_context(|| format!("failed to open log {}", path.display()))?;
    let log = parse(BufReader::new(file))
        .with_context(|| format!("failed to read log {}", path.display()))?;
    info!(
        path = %path.display(),
        rows = log.records.len(),
        skipped = log.skipped,
        locations = log.coordinates.len(),
        "event log parsed"
    );
    Ok(log)
}

/// Parses log rows, skipping the header line.
pub(crate) fn parse(reader: impl BufRead) -> Result<LoadedLog> {
    let mut log = LoadedLog::default();

    for (index, line) in reader.lines().enumerate().skip(1) {
        let line = line.with_context(|| format!("failed to read line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }

        let fields = split_row(&line);
        let Some(record) = parse_record(&fields) else {
            debug!(line = index + 1, columns = fields.len(), "skipping malformed row");
            log.skipped += 1;
            continue;
        };

        // Later rows win when a location is reported with different coordinates.
        if let Some(coordinate) = parse_geo(&fields[GEO_COLUMN]) {
            let _ = log.coordinates.insert(record.location.clone(), coordinate);
        }
        log.records.push(record);
    }

    Ok(log)
}

fn parse_record(fields: &[String]) -> Option<ObservationRecord> {
    if fields.len() < MIN_COLUMNS {
        return None;
    }
    let hour: i64 = fields[HOUR_COLUMN].trim().parse().ok()?;
    let agent: u32 = fields[AGENT_COLUMN].trim().parse().ok()?;
    Some(ObservationRecord::new(
        Hour::new(hour as f64),
        AgentId::new(agent),
        LocationId::new(fields[LOCATION_COLUMN].as_str()),
    ))
}

fn parse_geo(field: &str) -> Option<Coordinate> {
    let (lat, lon) = field.trim().split_once(',')?;
    if lon.contains(',') {
        return None;
    }
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    (lat.is_finite() && lon.is_finite()).then(|| Coordinate::new(lat, lon))
}

/// Splits one CSV line, honouring double quotes and `""` escapes.
fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match (ch, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                let _ = chars.next();
            }
            ('"', _) => quoted = !quoted,
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(ch),
        }
    }
    fields.push(field);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "hour,agent,name,age,gender,job,location,activity,mood,health,geo\n";

    fn load(rows: &str) -> LoadedLog {
        parse(format!("{HEADER}{rows}").as_bytes()).expect("in-memory log is readable")
    }

    #[test]
    fn split_row_keeps_quoted_commas() {
        assert_eq!(
            split_row(r#"1,"a, b",,"say ""hi""""#),
            vec!["1", "a, b", "", r#"say "hi""#]
        );
    }

    #[test]
    fn rows_yield_records_and_coordinates() {
        let log = load(
            "3,7,Ann,30,f,clerk,office,work,ok,90,\"55.76,37.62\"\n\
             4,7,Ann,30,f,clerk,home,rest,ok,90,\"55.70, 37.60\"\n",
        );

        assert_eq!(log.records.len(), 2);
        assert_eq!(log.records[0].offset, Hour::new(3.0));
        assert_eq!(log.records[0].agent, AgentId::new(7));
        assert_eq!(log.records[1].location, LocationId::new("home"));
        assert_eq!(
            log.coordinates.get(&LocationId::new("home")),
            Some(&Coordinate::new(55.70, 37.60))
        );
        assert_eq!(log.skipped, 0);
    }

    #[test]
    fn short_and_unparsable_rows_are_skipped() {
        let log = load(
            "1,2,3\n\
             x,7,Ann,30,f,clerk,office,work,ok,90,\"1,2\"\n\
             5,7,Ann,30,f,clerk,office,work,ok,90,\"1,2\"\n",
        );

        assert_eq!(log.records.len(), 1);
        assert_eq!(log.skipped, 2);
    }

    #[test]
    fn missing_geo_keeps_the_record() {
        let log = load(
            "5,7,Ann,30,f,clerk,lab,work,ok,90, \n\
             6,8,Bob,31,m,cook,lab,work,ok,90,bad\n",
        );

        assert_eq!(log.records.len(), 2);
        assert!(log.coordinates.is_empty());
    }

    #[test]
    fn later_coordinates_replace_earlier_ones() {
        let log = load(
            "1,7,Ann,30,f,clerk,lab,work,ok,90,\"1,2\"\n\
             2,8,Bob,31,m,cook,lab,work,ok,90,\"3,4\"\n",
        );

        assert_eq!(
            log.coordinates.get(&LocationId::new("lab")),
            Some(&Coordinate::new(3.0, 4.0))
        );
    }
}
