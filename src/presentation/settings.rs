use crate::domain::settings::AppSettings;

/// `label: value` lines in the order of the settings screen.
pub fn render_settings(settings: &AppSettings) -> String {
    [
        ("Name", settings.user_name.clone()),
        ("Email", settings.user_email.clone()),
        ("Theme", settings.theme.as_str().to_string()),
        ("Table density", settings.table_density.as_str().to_string()),
        ("Items per page", settings.items_per_page.to_string()),
    ]
    .iter()
    .map(|(label, value)| format!("{label:<15} {value}"))
    .collect::<Vec<_>>()
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_render_one_line_per_field() {
        let rendered = render_settings(&AppSettings::default());
        let lines: Vec<_> = rendered.lines().collect();

        assert_eq!(lines.len(), 5);
        insta::assert_snapshot!(lines[0], @"Name            Admin User");
        insta::assert_snapshot!(lines[4], @"Items per page  10");
    }
}
