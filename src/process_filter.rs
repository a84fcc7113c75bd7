/// Specifies which processes contribute rows and statistics.
///
/// Name matches compare the image basename case-insensitively. An empty
/// filter (no pid and no names) targets every process that is not excluded.
#[derive(Debug, Clone, Default)]
pub struct ProcessFilter {
    pub target_pid: Option<u32>,
    pub target_names: Vec<String>,
    pub exclude_names: Vec<String>,
}

impl ProcessFilter {
    pub fn capture_all(&self) -> bool {
        self.target_pid.is_none() && self.target_names.is_empty()
    }

    /// First match wins: exclusion beats every other rule.
    pub fn is_target(&self, process_id: u32, process_name: &str) -> bool {
        if self
            .exclude_names
            .iter()
            .any(|name| name.eq_ignore_ascii_case(process_name))
        {
            return false;
        }

        if self.capture_all() {
            return true;
        }

        if self.target_pid == Some(process_id) {
            return true;
        }

        self.target_names
            .iter()
            .any(|name| name.eq_ignore_ascii_case(process_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_targets_everything() {
        let filter = ProcessFilter::default();
        assert!(filter.is_target(1, "game.exe"));
        assert!(filter.is_target(99, "dwm.exe"));
    }

    #[test]
    fn exclusion_beats_all_other_rules() {
        let filter = ProcessFilter {
            target_pid: Some(7),
            target_names: vec!["foo.exe".into()],
            exclude_names: vec!["FOO.EXE".into()],
        };
        assert!(!filter.is_target(7, "foo.exe"));

        let capture_all = ProcessFilter {
            exclude_names: vec!["foo.exe".into()],
            ..Default::default()
        };
        assert!(!capture_all.is_target(1, "foo.exe"));
        assert!(capture_all.is_target(1, "bar.exe"));
    }

    #[test]
    fn pid_and_name_matching() {
        let filter = ProcessFilter {
            target_pid: Some(7),
            target_names: vec!["Game.Exe".into()],
            exclude_names: vec![],
        };
        assert!(filter.is_target(7, "anything.exe"));
        assert!(filter.is_target(8, "game.exe"));
        assert!(!filter.is_target(8, "other.exe"));
    }
}
