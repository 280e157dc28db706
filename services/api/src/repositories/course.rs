//! Course catalogue queries

use anyhow::Result;
use chrono::Utc;
use common::models::{Course, CourseModule, CourseState, Lesson, Notice};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use super::parse_column;

#[derive(Clone)]
pub struct CourseRepository {
    pool: PgPool,
}

impl CourseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Course headers, newest first. Only `ACTIVE` courses unless
    /// `include_unpublished`.
    pub async fn list(&self, include_unpublished: bool) -> Result<Vec<Course>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, description, price, state, created_at, updated_at
            FROM courses
            WHERE $1 OR state = 'ACTIVE'
            ORDER BY created_at DESC
            "#,
        )
        .bind(include_unpublished)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(course_from_row).collect()
    }

    /// A course with its modules, lessons and notice board
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Course>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, description, price, state, created_at, updated_at
            FROM courses
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut course = course_from_row(&row)?;

        let module_rows = sqlx::query(
            "SELECT id, course_id, title, position FROM course_modules WHERE course_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let lesson_rows = sqlx::query(
            r#"
            SELECT l.id, l.module_id, l.title, l.content, l.video_url, l.position
            FROM lessons l
            JOIN course_modules m ON m.id = l.module_id
            WHERE m.course_id = $1
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let notice_rows = sqlx::query(
            "SELECT id, course_id, message, created_at FROM notices WHERE course_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut modules = module_rows
            .iter()
            .map(|row| {
                Ok(CourseModule {
                    id: row.try_get("id")?,
                    course_id: row.try_get("course_id")?,
                    title: row.try_get("title")?,
                    position: row.try_get("position")?,
                    lessons: Vec::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        for row in &lesson_rows {
            let lesson = Lesson {
                id: row.try_get("id")?,
                module_id: row.try_get("module_id")?,
                title: row.try_get("title")?,
                content: row.try_get("content")?,
                video_url: row.try_get("video_url")?,
                position: row.try_get("position")?,
            };
            if let Some(module) = modules.iter_mut().find(|m| m.id == lesson.module_id) {
                module.lessons.push(lesson);
            }
        }

        course.modules = modules;
        course.notice_board = notice_rows
            .iter()
            .map(|row| {
                Ok(Notice {
                    id: row.try_get("id")?,
                    course_id: row.try_get("course_id")?,
                    message: row.try_get("message")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        course.sort_contents();

        Ok(Some(course))
    }

    /// Publish, unpublish or retire a course
    pub async fn set_state(&self, id: Uuid, state: CourseState) -> Result<Option<Course>> {
        info!("Setting course {} to {}", id, state);

        let row = sqlx::query(
            r#"
            UPDATE courses SET state = $2, updated_at = $3
            WHERE id = $1
            RETURNING id, title, description, price, state, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(state.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(course_from_row).transpose()
    }
}

fn course_from_row(row: &PgRow) -> Result<Course> {
    Ok(Course {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        price: row.try_get("price")?,
        state: parse_column(row, "state")?,
        modules: Vec::new(),
        notice_board: Vec::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
