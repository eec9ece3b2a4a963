use anyhow::{Result, bail};
use std::path::{Path, PathBuf};

/// Tracks requested on the command line, plus the groups as written for naming the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackList {
    pub tracks: Vec<usize>,
    pub groups: Vec<String>,
}

impl TrackList {
    /// `track 04` or `tracks 02-05, 07`
    pub fn label(&self) -> String {
        if self.tracks.len() > 1 {
            let mut groups = self.groups.clone();
            groups.sort();
            format!("tracks {}", groups.join(", "))
        } else {
            format!("track {}", self.groups.first().map(String::as_str).unwrap_or("--"))
        }
    }
}

/// Parse `4`, `2-5` style track arguments.
pub fn parse_track_list<S: AsRef<str>>(args: &[S]) -> Result<TrackList> {
    let mut tracks = Vec::new();
    let mut groups = Vec::new();

    for arg in args {
        let arg = arg.as_ref().trim();
        if arg.is_empty() {
            continue;
        }

        if let Some((start, end)) = arg.split_once('-') {
            let (Ok(start), Ok(end)) = (start.parse::<usize>(), end.parse::<usize>()) else {
                bail!("Invalid track range: {}", arg);
            };
            if start > end {
                bail!("Invalid track range: {}", arg);
            }

            tracks.extend(start..=end);
            groups.push(format!("{:02}-{:02}", start, end));
        } else if let Ok(track) = arg.parse::<usize>() {
            tracks.push(track);
            groups.push(format!("{:02}", track));
        } else {
            bail!("Invalid tracks argument: {}", arg);
        }
    }

    if tracks.is_empty() {
        bail!("No tracks given..!");
    }

    Ok(TrackList { tracks, groups })
}

/// `dir/BGM.KDT` + `track 03` -> `dir/BGM (track 03).KDT`
pub fn labelled_path(path: &Path, label: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    path.with_file_name(format!("{} ({}).KDT", stem, label))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_tracks_and_ranges() {
        let list = parse_track_list(&["2-4", "7"]).unwrap();
        assert_eq!(list.tracks, vec![2, 3, 4, 7]);
        assert_eq!(list.groups, vec!["02-04", "07"]);
        assert_eq!(list.label(), "tracks 02-04, 07");

        let list = parse_track_list(&["5"]).unwrap();
        assert_eq!(list.label(), "track 05");
    }

    #[test]
    fn bad_track_arguments() {
        assert!(parse_track_list(&["x"]).is_err());
        assert!(parse_track_list(&["1-2-3"]).is_err());
        assert!(parse_track_list(&["5-2"]).is_err());
        assert!(parse_track_list(&["-3"]).is_err());
        assert!(parse_track_list::<&str>(&[]).is_err());
    }

    #[test]
    fn output_names() {
        let path = Path::new("music/BGM_01.KDT");
        assert_eq!(
            labelled_path(path, "track 03"),
            PathBuf::from("music/BGM_01 (track 03).KDT")
        );
    }
}
