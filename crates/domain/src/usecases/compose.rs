//! Post composition - renders classified events into bounded-length text
//!
//! Lengths are counted in `char`s, which is how the posting platforms count.

use crate::model::{Announcement, FindDetails, Listing};

const TRUNCATION_MARKER: char = '…';

/// Configuration for the composer
#[derive(Debug, Clone)]
pub struct ComposeConfig {
    /// Hard limit on the whole announcement, suffix included
    pub max_chars: usize,
    /// Tag appended to every announcement, never truncated
    pub hashtag: String,
    /// Site root prepended to each listing's detail path
    pub site_url: String,
    /// Area label used in the opening clause
    pub area_name: String,
}

/// Composer settings that cannot produce an in-budget announcement
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeConfigError {
    #[error("hashtag suffix needs {suffix} chars, leaving no room within max_chars = {max_chars}")]
    SuffixTooLong { suffix: usize, max_chars: usize },
}

impl ComposeConfig {
    /// The ` {hashtag}` suffix must leave at least one char of prose
    pub fn validate(&self) -> Result<(), ComposeConfigError> {
        let suffix = self.suffix().chars().count();
        if suffix >= self.max_chars {
            return Err(ComposeConfigError::SuffixTooLong {
                suffix,
                max_chars: self.max_chars,
            });
        }
        Ok(())
    }

    fn suffix(&self) -> String {
        format!(" {}", self.hashtag)
    }
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            max_chars: 500,
            hashtag: "#geocaching".to_string(),
            site_url: "https://www.geocaching.com".to_string(),
            area_name: String::new(),
        }
    }
}

/// Renders announcements for the posting collaborator
pub struct PostComposer {
    config: ComposeConfig,
}

impl PostComposer {
    pub fn new(config: ComposeConfig) -> Self {
        Self { config }
    }

    /// Absolute URL for a listing's detail page
    pub fn item_url(&self, listing: &Listing) -> String {
        format!(
            "{}{}",
            self.config.site_url.trim_end_matches('/'),
            listing.detail_path
        )
    }

    /// Announcement for someone logging activity on a known item
    pub fn compose_find(&self, listing: &Listing, find: &FindDetails) -> Announcement {
        let url = self.item_url(listing);
        let mut prose = format!(
            "In {}, \"{}\" just found the \"{}\" geocache! {}",
            self.config.area_name, find.actor, listing.name, url
        );
        if find.same_day_count > 1 {
            prose.push_str(&format!(
                " That's their {} find today!",
                ordinal(find.same_day_count)
            ));
        }
        prose.push_str(&format!(" They wrote: \"{}\"", find.note));

        self.finish(prose, listing, url)
    }

    /// Announcement for a first-seen item
    pub fn compose_new_cache(&self, listing: &Listing) -> Announcement {
        let url = self.item_url(listing);
        let prose = format!(
            "In {}, \"{}\" just placed a new geocache: \"{}\"! {}",
            self.config.area_name, listing.owner, listing.name, url
        );

        self.finish(prose, listing, url)
    }

    fn finish(&self, prose: String, listing: &Listing, url: String) -> Announcement {
        let suffix = self.config.suffix();
        let budget = self
            .config
            .max_chars
            .saturating_sub(suffix.chars().count());

        let mut text = truncate_chars(&prose, budget);
        text.push_str(&suffix);

        Announcement {
            text,
            item_code: listing.code.clone(),
            item_url: url,
        }
    }
}

/// Cut `s` to at most `max` chars, ending with the truncation marker if cut
fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max == 0 {
        return String::new();
    }

    let mut out: String = s.chars().take(max - 1).collect();
    out.push(TRUNCATION_MARKER);
    out
}

/// English ordinal for a count: 1st, 2nd, 3rd, 4th, 11th, 21st, ...
pub fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_listing() -> Listing {
        Listing {
            code: "GC1234".to_string(),
            name: "Secret Hideout".to_string(),
            owner: "johndoe".to_string(),
            placed_at: None,
            last_activity_at: None,
            premium_only: false,
            detail_path: "/geocache/GC1234".to_string(),
            guid: None,
        }
    }

    fn composer() -> PostComposer {
        PostComposer::new(ComposeConfig {
            area_name: "Blerpville".to_string(),
            ..Default::default()
        })
    }

    fn find(count: u32, note: &str) -> FindDetails {
        FindDetails {
            actor: "Amy".to_string(),
            note: note.to_string(),
            same_day_count: count,
        }
    }

    #[test]
    fn test_compose_find_first_of_day() {
        let post = composer().compose_find(&sample_listing(), &find(1, "Lovely spot"));

        assert_eq!(
            post.text,
            "In Blerpville, \"Amy\" just found the \"Secret Hideout\" geocache! \
             https://www.geocaching.com/geocache/GC1234 They wrote: \"Lovely spot\" #geocaching"
        );
        assert_eq!(post.item_code, "GC1234");
        assert!(!post.text.contains("find today"));
    }

    #[test]
    fn test_compose_find_includes_ordinal_after_first() {
        let post = composer().compose_find(&sample_listing(), &find(2, "Again!"));
        assert!(post.text.contains("That's their 2nd find today!"));

        let post = composer().compose_find(&sample_listing(), &find(13, "Busy"));
        assert!(post.text.contains("That's their 13th find today!"));
    }

    #[test]
    fn test_compose_new_cache_names_owner_without_log_sentence() {
        let post = composer().compose_new_cache(&sample_listing());

        assert!(post.text.contains("\"johndoe\""));
        assert!(post.text.contains("Secret Hideout"));
        assert!(!post.text.contains("They wrote"));
        assert!(post.text.ends_with(" #geocaching"));
    }

    #[test]
    fn test_long_note_is_truncated_but_suffix_survives() {
        let note = "é".repeat(2000);
        let post = composer().compose_find(&sample_listing(), &find(3, &note));

        assert_eq!(post.text.chars().count(), 500);
        assert!(post.text.ends_with("… #geocaching"));
    }

    #[test]
    fn test_long_name_is_truncated() {
        let mut listing = sample_listing();
        listing.name = "x".repeat(800);
        let post = composer().compose_new_cache(&listing);

        assert!(post.text.chars().count() <= 500);
        assert!(post.text.ends_with("… #geocaching"));
    }

    #[test]
    fn test_prose_exactly_at_budget_is_not_truncated() {
        let composer = PostComposer::new(ComposeConfig {
            max_chars: 20,
            hashtag: "#gc".to_string(),
            ..Default::default()
        });
        // budget is 20 - " #gc".len() = 16
        assert_eq!(truncate_chars("abcdefghijklmnop", 16), "abcdefghijklmnop");
        assert_eq!(truncate_chars("abcdefghijklmnopq", 16), "abcdefghijklmno…");

        let post = composer.compose_new_cache(&sample_listing());
        assert_eq!(post.text.chars().count(), 20);
        assert!(post.text.ends_with("… #gc"));
    }

    #[test]
    fn test_hashtag_that_fills_the_budget_is_rejected() {
        assert!(ComposeConfig::default().validate().is_ok());

        let config = ComposeConfig {
            max_chars: 10,
            hashtag: "#geocaching".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ComposeConfigError::SuffixTooLong {
                suffix: 12,
                max_chars: 10
            })
        );

        // Exactly one char of prose left is still usable
        let config = ComposeConfig {
            max_chars: 5,
            hashtag: "#gc".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        let post = PostComposer::new(config).compose_new_cache(&sample_listing());
        assert_eq!(post.text, "… #gc");
    }

    #[test]
    fn test_ordinals() {
        let cases = [
            (1, "1st"),
            (2, "2nd"),
            (3, "3rd"),
            (4, "4th"),
            (11, "11th"),
            (12, "12th"),
            (21, "21st"),
            (102, "102nd"),
            (111, "111th"),
        ];
        for (n, expected) in cases {
            assert_eq!(ordinal(n), expected);
        }
    }
}
