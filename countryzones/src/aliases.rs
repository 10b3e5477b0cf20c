//! The backward-link alias table.
//!
//! The tz database's `backward` file declares old zone names as links to
//! current ones. Links may point at other links (a zone renamed twice), but
//! never deeper than that: after collapsing one hop, any link whose target
//! is still a link is either a longer chain or a cycle, and both mean the
//! input is unusable.

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AliasError {
    #[error("{file}: link {link} is declared twice")]
    DuplicateLink { file: String, link: String },
    #[error("{file}: alias chain from {link} via {via} never reaches a real zone")]
    AliasCycle { file: String, link: String, via: String },
}

/// Old zone id → the current id it stands for.
#[derive(Default, Clone, PartialEq, Eq, Debug)]
pub struct AliasMap {
    links: BTreeMap<String, String>,
}

impl AliasMap {
    /// Parses `backward`-format text: `Link <target> <link-name>` lines;
    /// every other line is ignored.
    pub fn parse(file: &str, text: &str) -> Result<AliasMap, AliasError> {
        let mut raw: BTreeMap<String, String> = BTreeMap::new();
        for line in text.lines() {
            let mut fields = line.split_whitespace();
            if fields.next() != Some("Link") {
                continue;
            }
            let (Some(target), Some(link)) = (fields.next(), fields.next()) else {
                continue;
            };
            if raw.insert(link.to_owned(), target.to_owned()).is_some() {
                return Err(AliasError::DuplicateLink {
                    file: file.to_owned(),
                    link: link.to_owned(),
                });
            }
        }

        let mut links = BTreeMap::new();
        for (link, target) in &raw {
            let resolved = raw.get(target).unwrap_or(target);
            if raw.contains_key(resolved) {
                return Err(AliasError::AliasCycle {
                    file: file.to_owned(),
                    link: link.clone(),
                    via: target.clone(),
                });
            }
            let _ = links.insert(link.clone(), resolved.clone());
        }
        Ok(AliasMap { links })
    }

    /// The current id `zone_id` links to, if it is an old name.
    pub fn target(&self, zone_id: &str) -> Option<&str> {
        self.links.get(zone_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.links.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Writes the map back out in `backward` format. Parsing the result
    /// reproduces the map exactly.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (link, target) in &self.links {
            out.push_str("Link\t");
            out.push_str(target);
            out.push('\t');
            out.push_str(link);
            out.push('\n');
        }
        out
    }
}
