// Property-based tests for the crontab parser.

use common::crontab::CrontabParser;
use proptest::prelude::*;

fn parse(text: &str) -> Vec<common::crontab::CrontabEntry> {
    CrontabParser::new(text.as_bytes(), "proptest")
        .parse()
        .unwrap()
}

proptest! {
    /// Valid job lines survive any amount of interleaved junk; the junk
    /// itself never produces entries and never aborts the parse.
    #[test]
    fn junk_lines_never_abort_the_parse(
        junk in proptest::collection::vec("[-a-z*@ ]{0,20}", 0..10),
        jobs in 1usize..5
    ) {
        let mut text = String::new();
        let mut junk_lines = junk.iter();
        for i in 0..jobs {
            if let Some(line) = junk_lines.next() {
                // Guard against junk that happens to be a valid job or
                // assignment line; the alphabet above cannot produce one
                // because it has no digits and `@`-words are not macros,
                // but an empty or comment-like line is fine either way.
                text.push_str(line);
                text.push('\n');
            }
            text.push_str(&format!("@hourly root job-{}\n", i));
        }
        for line in junk_lines {
            text.push_str(line);
            text.push('\n');
        }

        let entries = parse(&text);
        let valid_junk = junk.iter().filter(|l| {
            // A junk line only parses when it happens to form a full
            // five-field line with user and command, which this alphabet
            // can produce with `*` tokens.
            !parse(&format!("{}\n", l)).is_empty()
        }).count();
        prop_assert_eq!(entries.len(), jobs + valid_junk);
    }

    /// Environment assignments accumulate in order and reassignment
    /// affects only later entries.
    #[test]
    fn env_assignment_scopes_forward(
        first in "[a-z]{1,8}",
        second in "[a-z]{1,8}"
    ) {
        let text = format!(
            "VAR={first}\n@daily root one\nVAR={second}\n@daily root two\n"
        );
        let entries = parse(&text);
        prop_assert_eq!(entries.len(), 2);
        prop_assert_eq!(entries[0].env.clone(), vec![format!("VAR={first}")]);
        prop_assert_eq!(entries[1].env.clone(), vec![format!("VAR={second}")]);
    }

    /// The command keeps its internal whitespace verbatim.
    #[test]
    fn command_text_is_preserved(command in "[a-z]+( +[a-z]+){0,4}") {
        let entries = parse(&format!("30 6 * * * root {}\n", command));
        prop_assert_eq!(entries.len(), 1);
        prop_assert_eq!(entries[0].command.clone(), command);
    }
}
