//! Course catalog models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Publication state of a course
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CourseState {
    Draft,
    Active,
    Inactive,
}

impl CourseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseState::Draft => "DRAFT",
            CourseState::Active => "ACTIVE",
            CourseState::Inactive => "INACTIVE",
        }
    }
}

impl fmt::Display for CourseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(CourseState::Draft),
            "ACTIVE" => Ok(CourseState::Active),
            "INACTIVE" => Ok(CourseState::Inactive),
            other => Err(format!("Unknown course state: {}", other)),
        }
    }
}

/// Course entity with its nested content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub state: CourseState,
    #[serde(default)]
    pub modules: Vec<CourseModule>,
    #[serde(default)]
    pub notice_board: Vec<Notice>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    /// Only published courses take new enrollments.
    pub fn accepts_enrollments(&self) -> bool {
        self.state == CourseState::Active
    }

    /// Put modules and their lessons in `position` order, newest notices
    /// first.
    pub fn sort_contents(&mut self) {
        self.modules.sort_by_key(|m| m.position);
        for module in &mut self.modules {
            module.lessons.sort_by_key(|l| l.position);
        }
        self.notice_board
            .sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
}

/// An ordered section of a course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseModule {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub position: i32,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: Uuid,
    pub module_id: Uuid,
    pub title: String,
    pub content: Option<String>,
    pub video_url: Option<String>,
    pub position: i32,
}

/// Announcement pinned to a course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub id: Uuid,
    pub course_id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Request body for changing a course's state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCourseStateRequest {
    pub state: CourseState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn lesson(module_id: Uuid, position: i32) -> Lesson {
        Lesson {
            id: Uuid::new_v4(),
            module_id,
            title: format!("Lesson {}", position),
            content: None,
            video_url: None,
            position,
        }
    }

    #[test]
    fn test_sort_contents_orders_by_position() {
        let course_id = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let now = Utc::now();

        let mut course = Course {
            id: course_id,
            title: "Anatomy".to_string(),
            description: "Human anatomy basics".to_string(),
            price: 1500.0,
            state: CourseState::Active,
            modules: vec![
                CourseModule {
                    id: second,
                    course_id,
                    title: "Muscles".to_string(),
                    position: 2,
                    lessons: vec![],
                },
                CourseModule {
                    id: first,
                    course_id,
                    title: "Bones".to_string(),
                    position: 1,
                    lessons: vec![lesson(first, 3), lesson(first, 1), lesson(first, 2)],
                },
            ],
            notice_board: vec![
                Notice {
                    id: Uuid::new_v4(),
                    course_id,
                    message: "old".to_string(),
                    created_at: now - Duration::days(2),
                },
                Notice {
                    id: Uuid::new_v4(),
                    course_id,
                    message: "new".to_string(),
                    created_at: now,
                },
            ],
            created_at: now,
            updated_at: now,
        };

        course.sort_contents();

        assert_eq!(course.modules[0].id, first);
        let positions: Vec<i32> = course.modules[0].lessons.iter().map(|l| l.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert_eq!(course.notice_board[0].message, "new");
    }

    #[test]
    fn test_course_state_wire_format() {
        assert_eq!(
            serde_json::to_string(&CourseState::Inactive).unwrap(),
            "\"INACTIVE\""
        );
        assert_eq!("DRAFT".parse::<CourseState>().unwrap(), CourseState::Draft);
        assert!("draft".parse::<CourseState>().is_err());
    }
}
