use std::io::Write;

use chrono::{DateTime, SecondsFormat};
use color_eyre::Result;
use scanlog_core::{
    scan::{now_millis, NewScan, ScanRecord},
    store::ScanStore,
};

use crate::cli::{AddArgs, ScanCommand};

/// Execute a scan subcommand against the selected store.
pub async fn handle(cmd: ScanCommand, store: &dyn ScanStore, out: &mut impl Write) -> Result<()> {
    match cmd {
        ScanCommand::Add(args) => {
            let id = store.add(new_scan(args)).await?;
            writeln!(out, "Recorded scan {id}")?;
        }
        ScanCommand::List { json, limit } => {
            let mut scans = store.list_all().await?;
            if let Some(limit) = limit {
                scans.truncate(limit);
            }
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&scans)?)?;
            } else if scans.is_empty() {
                writeln!(out, "No scans yet. Record one with `scanlog add <data>`.")?;
            } else {
                for scan in &scans {
                    write_summary(out, scan)?;
                }
            }
        }
        ScanCommand::Show { id, json } => match store.find_by_id(id).await? {
            Some(scan) if json => writeln!(out, "{}", serde_json::to_string_pretty(&scan)?)?,
            Some(scan) => write_detail(out, &scan)?,
            None => writeln!(out, "Scan {id} not found")?,
        },
        ScanCommand::Delete { id } => {
            if store.delete_by_id(id).await? {
                writeln!(out, "Deleted scan {id}")?;
            } else {
                writeln!(out, "Scan {id} not found; nothing deleted")?;
            }
        }
    }

    Ok(())
}

fn new_scan(args: AddArgs) -> NewScan {
    NewScan {
        qr_data: args.qr_data,
        latitude: args.lat,
        longitude: args.lon,
        altitude: args.alt,
        accuracy: args.accuracy,
        timestamp: args.timestamp.unwrap_or_else(now_millis),
    }
}

fn captured_at(timestamp: i64) -> String {
    DateTime::from_timestamp_millis(timestamp)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| timestamp.to_string())
}

fn location_label(scan: &ScanRecord) -> Option<String> {
    let (lat, lon) = (scan.latitude?, scan.longitude?);
    let mut label = format!("{lat:.6}, {lon:.6}");
    if let Some(acc) = scan.accuracy {
        label.push_str(&format!(" ±{acc}m"));
    }
    if let Some(alt) = scan.altitude {
        label.push_str(&format!(" alt {alt}m"));
    }
    Some(label)
}

fn write_summary(out: &mut impl Write, scan: &ScanRecord) -> Result<()> {
    writeln!(out, "{} [{}] {}", scan.id, captured_at(scan.timestamp), scan.qr_data)?;
    if let Some(location) = location_label(scan) {
        writeln!(out, "    at {location}")?;
    }
    Ok(())
}

fn write_detail(out: &mut impl Write, scan: &ScanRecord) -> Result<()> {
    writeln!(out, "id:        {}", scan.id)?;
    writeln!(out, "data:      {}", scan.qr_data)?;
    writeln!(out, "captured:  {}", captured_at(scan.timestamp))?;
    writeln!(out, "stored:    {}", scan.created_at)?;
    writeln!(
        out,
        "location:  {}",
        location_label(scan).unwrap_or_else(|| "unavailable".to_string())
    )?;
    Ok(())
}
