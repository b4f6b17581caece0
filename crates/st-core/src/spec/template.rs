//! Starter spec file generation

/// Extension appended to spec files created by `spec init`
pub const SPEC_SUFFIX: &str = ".yml";

/// Options for rendering a starter spec file
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateOptions {
    /// Explain each field with a comment
    pub with_comments: bool,
    /// Leave out the `keys` section so the file is portable between users
    pub exclude_keys: bool,
}

struct Template {
    out: String,
    with_comments: bool,
}

impl Template {
    fn line(&mut self, indent: usize, text: &str) {
        for _ in 0..indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn comment(&mut self, indent: usize, text: &str) {
        if self.with_comments {
            self.line(indent, &format!("# {}", text));
        }
    }
}

/// Render a starter spec file describing two example hosts
pub fn spec_template(options: TemplateOptions) -> String {
    let mut t = Template {
        out: String::new(),
        with_comments: options.with_comments,
    };

    t.comment(0, "Hosts and files to tail");
    t.line(0, "hosts:");
    t.line(1, "host1:");
    t.line(2, "hostname: remote-host-1");
    t.comment(2, "Excluding the username here will default it to the current user name");
    t.line(2, "file: /var/log/syslog");
    t.comment(2, "Default SSH port");
    t.line(2, "port: 22");
    t.line(1, "host2:");
    t.line(2, "hostname: remote-host-2");
    t.line(2, "username: me");
    t.line(2, "file: /var/log/syslog");
    t.line(2, "port: 22");

    if !options.exclude_keys {
        t.comment(0, "This section is optional for portability");
        t.line(0, "keys:");
        t.line(1, "host1:");
        t.comment(2, "Defaults to this value");
        t.line(2, "path: ~/.ssh/id_rsa");
        t.line(1, "host2:");
        t.comment(
            2,
            "If all of these values are the same, then 'sshtail usekey' may be more convenient.",
        );
        t.line(2, "path: ~/.ssh/id_rsa");
    }

    t.out
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_SPEC: &str = "hosts:
  host1:
    hostname: remote-host-1
    file: /var/log/syslog
    port: 22
  host2:
    hostname: remote-host-2
    username: me
    file: /var/log/syslog
    port: 22
keys:
  host1:
    path: ~/.ssh/id_rsa
  host2:
    path: ~/.ssh/id_rsa
";

    const COMMENTED_SPEC: &str = "# Hosts and files to tail
hosts:
  host1:
    hostname: remote-host-1
    # Excluding the username here will default it to the current user name
    file: /var/log/syslog
    # Default SSH port
    port: 22
  host2:
    hostname: remote-host-2
    username: me
    file: /var/log/syslog
    port: 22
# This section is optional for portability
keys:
  host1:
    # Defaults to this value
    path: ~/.ssh/id_rsa
  host2:
    # If all of these values are the same, then 'sshtail usekey' may be more convenient.
    path: ~/.ssh/id_rsa
";

    const NO_KEYS_SPEC: &str = "hosts:
  host1:
    hostname: remote-host-1
    file: /var/log/syslog
    port: 22
  host2:
    hostname: remote-host-2
    username: me
    file: /var/log/syslog
    port: 22
";

    #[test]
    fn test_default_template() {
        assert_eq!(spec_template(TemplateOptions::default()), DEFAULT_SPEC);
    }

    #[test]
    fn test_commented_template() {
        let options = TemplateOptions {
            with_comments: true,
            exclude_keys: false,
        };
        assert_eq!(spec_template(options), COMMENTED_SPEC);
    }

    #[test]
    fn test_template_without_keys() {
        let options = TemplateOptions {
            with_comments: false,
            exclude_keys: true,
        };
        assert_eq!(spec_template(options), NO_KEYS_SPEC);
    }
}
