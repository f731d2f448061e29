use attendance_sync_core::{AttendanceRecord, AttendanceStatus, NewAttendance};
use clap::Subcommand;

use crate::context::Context;

#[derive(Subcommand)]
pub enum RecordAction {
    /// Record attendance for one student in one lecture
    Add {
        /// Lecture ID
        lecture: String,
        /// Course ID
        course: String,
        /// Student ID
        student: String,
        /// present, absent, late or excused
        status: String,
        /// Student display name
        #[arg(long)]
        name: Option<String>,
        /// Provenance tag (defaults to offline_manual)
        #[arg(long)]
        method: Option<String>,
    },
    /// List records held locally
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Only records awaiting delivery
        #[arg(long)]
        pending: bool,
    },
}

pub async fn run(action: RecordAction, ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        RecordAction::Add {
            lecture,
            course,
            student,
            status,
            name,
            method,
        } => {
            let status: AttendanceStatus = status.parse()?;
            let mut intent = NewAttendance::new(lecture, course, student, status);
            if let Some(name) = name {
                intent = intent.with_student_name(name);
            }
            if let Some(method) = method {
                intent = intent.with_method(method);
            }

            let record = ctx.engine.add_attendance_record(intent).await?;
            println!(
                "Recorded {} for {} in {} ({})",
                record.status, record.student_id, record.lecture_id, record.local_id
            );
            println!("Pending: {}", ctx.engine.pending_records_count());
            ctx.engine.shutdown().await;
        }
        RecordAction::List { json, pending } => {
            let records = if pending {
                ctx.engine.pending_records().await
            } else {
                ctx.engine.records().await
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No records.");
            } else {
                for record in &records {
                    println!("{}", format_record(record));
                }
            }
        }
    }
    Ok(())
}

fn format_record(record: &AttendanceRecord) -> String {
    let state = if record.synced { "synced" } else { "pending" };
    let mut line = format!(
        "{}  {}  {}  {:<8} {:<8} {}",
        record.local_id,
        record.lecture_id,
        record.student_id,
        record.status.as_str(),
        state,
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
    );
    if let Some(error) = &record.sync_error {
        line.push_str(&format!("  error: {error}"));
    }
    line
}
