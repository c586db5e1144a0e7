use std::fmt::Write;

use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};

use crate::application::admin::users_list::{UserListView, UserTable};
use crate::domain::entities::UserRecord;

const LAST_LOGIN_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

/// One table row with every cell already formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRowView {
    pub name: String,
    pub email: String,
    pub role_label: &'static str,
    pub status_label: &'static str,
    pub last_login: String,
}

impl From<&UserRecord> for UserRowView {
    fn from(user: &UserRecord) -> Self {
        Self {
            name: user.name.clone(),
            email: user.email.clone(),
            role_label: user.role.label(),
            status_label: user.status.label(),
            last_login: format_last_login(user.last_login),
        }
    }
}

fn format_last_login(at: OffsetDateTime) -> String {
    at.format(LAST_LOGIN_FORMAT)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// `Page 1 of 2 (7 users)`, with a marker while a refetch runs.
pub fn pagination_summary(table: &UserTable) -> String {
    let noun = if table.total == 1 { "user" } else { "users" };
    let mut summary = format!(
        "Page {} of {} ({} {noun})",
        table.page,
        table.total_pages.max(1),
        table.total
    );
    if table.refreshing {
        summary.push_str(" [refreshing]");
    }
    summary
}

/// Render the list area as plain text.
pub fn render_user_list(view: &UserListView) -> String {
    match view {
        UserListView::Skeleton => "Loading users...".to_string(),
        UserListView::Error { message } => {
            format!("Could not load users: {message}\nRun the command again to retry.")
        }
        UserListView::Empty { refreshing } => {
            if *refreshing {
                "No users found. [refreshing]".to_string()
            } else {
                "No users found.".to_string()
            }
        }
        UserListView::Populated(table) => render_table(table),
    }
}

fn render_table(table: &UserTable) -> String {
    let rows: Vec<UserRowView> = table.rows.iter().map(UserRowView::from).collect();
    let name_width = column_width("NAME", rows.iter().map(|row| row.name.as_str()));
    let email_width = column_width("EMAIL", rows.iter().map(|row| row.email.as_str()));

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<name_width$}  {:<email_width$}  {:<7}  {:<8}  LAST LOGIN",
        "NAME", "EMAIL", "ROLE", "STATUS"
    );
    for row in &rows {
        let _ = writeln!(
            out,
            "{:<name_width$}  {:<email_width$}  {:<7}  {:<8}  {}",
            row.name, row.email, row.role_label, row.status_label, row.last_login
        );
    }
    out.push_str(&pagination_summary(table));
    out
}

fn column_width<'a>(header: &str, cells: impl Iterator<Item = &'a str>) -> usize {
    cells
        .map(|cell| cell.chars().count())
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(header.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::seed_users;

    fn table(rows: Vec<UserRecord>, page: u32, total: u64, refreshing: bool) -> UserTable {
        UserTable {
            rows,
            page,
            page_size: 5,
            total,
            total_pages: 2,
            refreshing,
        }
    }

    #[test]
    fn row_view_formats_labels_and_login() {
        let users = seed_users();
        let row = UserRowView::from(&users[0]);

        insta::assert_snapshot!(
            format!("{} | {} | {} | {}", row.name, row.role_label, row.status_label, row.last_login),
            @"Ana Silva | Admin | Active | 2024-02-15 10:30"
        );
    }

    #[test]
    fn pagination_summary_marks_refreshing() {
        let summary = pagination_summary(&table(Vec::new(), 2, 7, true));
        insta::assert_snapshot!(summary, @"Page 2 of 2 (7 users) [refreshing]");
    }

    #[test]
    fn populated_table_ends_with_summary() {
        let users = seed_users();
        let rendered = render_user_list(&UserListView::Populated(table(
            users[5..].to_vec(),
            2,
            7,
            false,
        )));

        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("NAME"));
        assert!(lines[1].starts_with("Roberto Santos"));
        assert!(lines[2].contains("fernanda.l@corp.com"));
        assert_eq!(lines[3], "Page 2 of 2 (7 users)");
    }

    #[test]
    fn non_table_states() {
        insta::assert_snapshot!(render_user_list(&UserListView::Skeleton), @"Loading users...");
        insta::assert_snapshot!(
            render_user_list(&UserListView::Empty { refreshing: false }),
            @"No users found."
        );
        assert!(
            render_user_list(&UserListView::Error {
                message: "backend unavailable".to_string()
            })
            .starts_with("Could not load users: backend unavailable")
        );
    }
}
