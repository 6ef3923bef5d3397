use crate::catalog::TaskCatalog;
use crate::db::schema::Task;
use crate::template::ParsedTemplate;

/// Parses the bulk task file format: one `description;instruction` pair per
/// line. Lines that do not split into exactly two fields are skipped; the
/// 1-based line position becomes the task ID, so skipped lines leave gaps.
pub fn parse_tasks(contents: &str) -> anyhow::Result<TaskCatalog> {
    let mut catalog = TaskCatalog::new();

    for (index, line) in contents.lines().enumerate() {
        let fields: Vec<&str> = line.split(';').collect();
        if fields.len() != 2 {
            continue;
        }

        let description = fields[0].trim();
        let instruction = fields[1].trim();

        // Surfaces a TemplateFormatError naming the bad template instead of
        // letting it slip into the store.
        ParsedTemplate::new(description)?;

        catalog.add(Task {
            id: (index + 1) as i32,
            description: description.to_owned(),
            instruction: instruction.to_owned(),
            weight: 1,
        })?;
    }

    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_field_lines_become_tasks() {
        let catalog = parse_tasks("Pick up 5 logs;Submit a screenshot\nKill {1,3} goblins;Submit kills\n").unwrap();

        let tasks = catalog.tasks();
        assert_eq!(tasks.len(), 2);

        assert_eq!(tasks[0].id, 1);
        assert_eq!(tasks[0].description, "Pick up 5 logs");
        assert_eq!(tasks[0].instruction, "Submit a screenshot");
        assert_eq!(tasks[0].weight, 1);

        assert_eq!(tasks[1].id, 2);
        let template = ParsedTemplate::new(&tasks[1].description).unwrap();
        for _ in 0..20 {
            let evaluated = template.evaluate();
            assert!(evaluated.starts_with("Kill "));
            assert!(evaluated.ends_with(" goblins"));
            let n: i64 = evaluated
                .trim_start_matches("Kill ")
                .trim_end_matches(" goblins")
                .parse()
                .unwrap();
            assert!((1..=3).contains(&n));
        }
    }

    #[test]
    fn malformed_lines_are_skipped_but_keep_their_position() {
        let catalog = parse_tasks("no delimiter here\nA;B\ntoo;many;fields\nC;D\n").unwrap();

        let tasks = catalog.tasks();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, 2);
        assert_eq!(tasks[0].description, "A");
        assert_eq!(tasks[1].id, 4);
        assert_eq!(tasks[1].description, "C");
    }

    #[test]
    fn empty_input_yields_empty_catalog() {
        let catalog = parse_tasks("").unwrap();
        assert!(catalog.tasks().is_empty());
    }

    #[test]
    fn bad_template_aborts_the_load() {
        assert!(parse_tasks("Kill {1,} goblins;Submit kills\n").is_err());
    }
}
