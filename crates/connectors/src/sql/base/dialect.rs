//! Database-specific SQL syntax.

pub trait Dialect: Send + Sync {
    /// Wraps an identifier in the dialect's quotation marks.
    ///
    /// - PostgreSQL uses double quotes: `"my_column"`
    /// - MySQL uses backticks: `` `my_column` ``
    fn quote_identifier(&self, ident: &str) -> String;

    /// Placeholder for the zero-based parameter `index`.
    fn get_placeholder(&self, index: usize) -> String;

    fn name(&self) -> &'static str;

    /// Renders a possibly schema-qualified identifier, quoting only the parts
    /// that are not plain identifiers.
    fn identifier(&self, name: &str) -> String {
        name.split('.')
            .map(|part| {
                if is_plain_identifier(part) {
                    part.to_string()
                } else {
                    self.quote_identifier(part)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

fn is_plain_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn quote_identifier(&self, ident: &str) -> String {
        format!(r#""{}""#, ident.replace('"', "\"\""))
    }

    fn get_placeholder(&self, index: usize) -> String {
        format!("${}", index + 1)
    }

    fn name(&self) -> &'static str {
        "PostgreSQL"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn get_placeholder(&self, _index: usize) -> String {
        "?".into()
    }

    fn name(&self) -> &'static str {
        "MySQL"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_only_when_needed() {
        assert_eq!(Postgres.identifier("public.people"), "public.people");
        assert_eq!(Postgres.identifier("first name"), r#""first name""#);
        assert_eq!(MySql.identifier("db.order"), "db.order");
        assert_eq!(MySql.identifier("2fa"), "`2fa`");
    }

    #[test]
    fn placeholders() {
        assert_eq!(Postgres.get_placeholder(0), "$1");
        assert_eq!(MySql.get_placeholder(7), "?");
    }
}
