//! Offline cache of lecture details and course rosters.
//!
//! `put-*` commands take the JSON the remote API returned for a lecture or
//! a course's student list.

use attendance_sync_core::{LectureDetail, Student};
use clap::Subcommand;
use std::path::{Path, PathBuf};

use crate::context::Context;

#[derive(Subcommand)]
pub enum CacheAction {
    /// Show a cached lecture
    ShowLecture {
        /// Lecture ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Cache a lecture from a JSON file
    PutLecture {
        /// Path to the lecture JSON
        file: PathBuf,
    },
    /// List cached lectures, oldest first
    Lectures,
    /// Show the cached roster of a course
    Students {
        /// Course ID
        course: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Cache a course roster from a JSON file
    PutStudents {
        /// Course ID
        course: String,
        /// Path to the student list JSON
        file: PathBuf,
    },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&content)?)
}

pub async fn run(action: CacheAction, ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        CacheAction::ShowLecture { id, json } => {
            let snapshot = ctx
                .engine
                .cached_lecture(&id)
                .await
                .ok_or_else(|| format!("lecture not cached: {id}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                let lecture = &snapshot.lecture;
                println!("{} ({})", lecture.course_name, lecture.course_id);
                println!(
                    "{} {}-{}  room {}",
                    lecture.date,
                    lecture.start_time,
                    lecture.end_time,
                    lecture.room.as_deref().unwrap_or("-")
                );
                println!("Cached at {}", snapshot.cached_at.to_rfc3339());
                for student in &lecture.students {
                    println!("  {}  {}", student.student_id, student.full_name);
                }
            }
        }
        CacheAction::PutLecture { file } => {
            let lecture: LectureDetail = read_json(&file)?;
            let snapshot = ctx.engine.cache_lecture(lecture).await?;
            println!(
                "Cached lecture {} ({} students)",
                snapshot.id(),
                snapshot.lecture.students.len()
            );
        }
        CacheAction::Lectures => {
            let lectures = ctx.engine.cached_lectures().await;
            if lectures.is_empty() {
                println!("No cached lectures.");
            }
            for snapshot in &lectures {
                println!(
                    "{}  {}  {}  {}",
                    snapshot.id(),
                    snapshot.lecture.course_name,
                    snapshot.lecture.date,
                    snapshot.lecture.start_time
                );
            }
        }
        CacheAction::Students { course, json } => {
            let students = ctx
                .engine
                .cached_students(&course)
                .await
                .ok_or_else(|| format!("no cached roster for course {course}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&students)?);
            } else {
                for student in &students {
                    println!(
                        "{}  {}  {}",
                        student.student_id,
                        student.full_name,
                        student.email.as_deref().unwrap_or("")
                    );
                }
            }
        }
        CacheAction::PutStudents { course, file } => {
            let students: Vec<Student> = read_json(&file)?;
            let count = students.len();
            ctx.engine.cache_students(&course, students).await?;
            println!("Cached {count} students for course {course}");
        }
    }
    Ok(())
}
