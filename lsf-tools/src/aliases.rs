//! Real names for user accounts, read from `~/.useraliases`.

use std::collections::BTreeMap;
use std::path::Path;

/// One `<user> <alias>` per line, the alias may contain spaces.
#[derive(Debug, Clone, Default)]
pub struct UserAliases {
    aliases: BTreeMap<String, String>,
}

impl UserAliases {
    /// `$HOME/.useraliases`, or no aliases if there is none.
    pub fn load() -> Self {
        let Ok(home) = std::env::var("HOME") else {
            return Self::default();
        };
        Self::read(Path::new(&home).join(".useraliases"))
    }

    pub fn read(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                tracing::warn!("Unable to read {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> Self {
        let aliases = text
            .lines()
            .filter_map(|line| line.trim().split_once(char::is_whitespace))
            .map(|(user, alias)| (user.to_owned(), alias.trim().to_owned()))
            .collect();
        Self { aliases }
    }

    /// The alias of `user`, or `user` itself.
    pub fn alias_of<'a>(&'a self, user: &'a str) -> &'a str {
        self.aliases.get(user).map_or(user, String::as_str)
    }

    /// The user called `alias`, or `alias` itself.
    pub fn user_of<'a>(&'a self, alias: &'a str) -> &'a str {
        self.aliases
            .iter()
            .find(|(_, a)| a.as_str() == alias)
            .map_or(alias, |(user, _)| user.as_str())
    }

    /// Replace the aliases given to `-u` by user names.
    pub fn resolve_args(&self, mut args: Vec<String>) -> Vec<String> {
        for i in 1..args.len() {
            if args[i - 1] == "-u" {
                let users: Vec<&str> = args[i].split_whitespace().map(|a| self.user_of(a)).collect();
                let users = users.join(" ");
                args[i] = users;
            }
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn test_aliases() {
        let aliases = UserAliases::parse(indoc! {"
            ab123456 alice
            cd654321   Bob Builder

            broken
        "});
        assert_eq!(aliases.alias_of("ab123456"), "alice");
        assert_eq!(aliases.alias_of("cd654321"), "Bob Builder");
        assert_eq!(aliases.alias_of("root"), "root");
        assert_eq!(aliases.user_of("alice"), "ab123456");
        assert_eq!(aliases.user_of("carol"), "carol");

        let args = ["-q", "normal", "-u", "alice carol"].map(String::from).to_vec();
        assert_eq!(aliases.resolve_args(args), ["-q", "normal", "-u", "ab123456 carol"]);
    }

    #[test]
    fn test_missing_file() {
        let aliases = UserAliases::read("/surely/not/a/.useraliases");
        assert_eq!(aliases.alias_of("alice"), "alice");
    }
}
