use super::model::{Breed, BreedType};

const PROMPT_DESCRIPTION_MAX_CHARS: usize = 100;

/// Snapshot of the breed table used as the matching key space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BreedCatalog {
    breeds: Vec<Breed>,
}

impl BreedCatalog {
    pub fn new(breeds: Vec<Breed>) -> Self {
        Self { breeds }
    }

    pub fn breeds(&self) -> &[Breed] {
        self.breeds.as_slice()
    }

    pub fn len(&self) -> usize {
        self.breeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breeds.is_empty()
    }

    pub fn into_vec(self) -> Vec<Breed> {
        self.breeds
    }

    pub fn names(&self) -> Vec<String> {
        self.breeds.iter().map(|breed| breed.name.clone()).collect()
    }

    /// First breed whose name equals `name`, ignoring case and surrounding
    /// whitespace.
    pub fn find_exact(&self, name: &str) -> Option<&Breed> {
        let wanted = normalize_breed_name(name);
        if wanted.is_empty() {
            return None;
        }
        self.breeds
            .iter()
            .find(|breed| normalize_breed_name(&breed.name) == wanted)
    }

    /// Same as [`find_exact`](Self::find_exact) after removing every
    /// parenthesized group from `name`.
    pub fn find_stripped(&self, name: &str) -> Option<&Breed> {
        self.find_exact(&strip_parenthetical(name))
    }

    pub fn filtered(&self, breed_type: Option<BreedType>) -> Vec<Breed> {
        self.breeds
            .iter()
            .filter(|breed| breed_type.map_or(true, |wanted| breed.breed_type == wanted))
            .cloned()
            .collect()
    }

    pub fn sort_by_name(&mut self) {
        self.breeds.sort_by(|left, right| left.name.cmp(&right.name));
    }

    /// Names that occur more than once after normalization. Matching picks
    /// the first occurrence.
    pub fn duplicate_names(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        let mut duplicates: Vec<String> = Vec::new();
        for breed in &self.breeds {
            let key = normalize_breed_name(&breed.name);
            if seen.contains(&key) {
                if !duplicates.contains(&breed.name) {
                    duplicates.push(breed.name.clone());
                }
            } else {
                seen.push(key);
            }
        }
        duplicates
    }

    /// One `name (type) - description` line per breed, description cut to
    /// 100 characters.
    pub fn prompt_listing(&self) -> String {
        self.breeds
            .iter()
            .map(|breed| {
                let description = breed
                    .description
                    .as_deref()
                    .map(|text| text.chars().take(PROMPT_DESCRIPTION_MAX_CHARS).collect::<String>())
                    .unwrap_or_default();
                format!("{} ({}) - {}", breed.name, breed.breed_type, description)
                    .trim_end()
                    .to_string()
            })
            .collect::<Vec<String>>()
            .join("\n")
    }
}

impl From<Vec<Breed>> for BreedCatalog {
    fn from(breeds: Vec<Breed>) -> Self {
        Self::new(breeds)
    }
}

pub fn normalize_breed_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Removes each `(...)` group together with the whitespace around it, then
/// trims. An unclosed `(` is kept verbatim.
pub fn strip_parenthetical(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(open) = rest.find('(') {
        let Some(close_offset) = rest[open..].find(')') else {
            break;
        };
        out.push_str(rest[..open].trim_end());
        rest = rest[open + close_offset + 1..].trim_start();
    }
    out.push_str(rest);
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::{strip_parenthetical, BreedCatalog};
    use crate::breeds::{Breed, BreedType};

    fn catalog() -> BreedCatalog {
        BreedCatalog::new(vec![
            Breed::new("1", "Sahiwal", BreedType::Cattle).with_description("Punjab dairy breed"),
            Breed::new("2", "Red Sindhi", BreedType::Cattle),
            Breed::new("3", "Murrah", BreedType::Buffalo).with_description("x".repeat(150)),
            Breed::new("4", "Gir", BreedType::Cattle),
        ])
    }

    #[test]
    fn exact_match_ignores_case_and_padding() {
        let catalog = catalog();
        assert_eq!(
            catalog.find_exact("  red sindhi ").map(|b| b.id.as_str()),
            Some("2")
        );
        assert!(catalog.find_exact("Red Sindhi (cattle)").is_none());
        assert!(catalog.find_exact("   ").is_none());
    }

    #[test]
    fn stripped_match_drops_parenthesized_suffix() {
        let catalog = catalog();
        assert_eq!(
            catalog
                .find_stripped("Red Sindhi (cattle)")
                .map(|b| b.id.as_str()),
            Some("2")
        );
    }

    #[test]
    fn strip_parenthetical_handles_multiple_and_unclosed_groups() {
        assert_eq!(strip_parenthetical("Gir (cattle)"), "Gir");
        assert_eq!(strip_parenthetical("(Indian) Murrah (buffalo)"), "Murrah");
        assert_eq!(strip_parenthetical("Red (dairy) Sindhi"), "RedSindhi");
        assert_eq!(strip_parenthetical("Ongole (draft"), "Ongole (draft");
        assert_eq!(strip_parenthetical("Kankrej"), "Kankrej");
    }

    #[test]
    fn filtered_and_sorted_listing() {
        let mut catalog = catalog();
        catalog.sort_by_name();
        assert_eq!(
            catalog.names(),
            vec!["Gir", "Murrah", "Red Sindhi", "Sahiwal"]
        );
        let buffaloes = catalog.filtered(Some(BreedType::Buffalo));
        assert_eq!(buffaloes.len(), 1);
        assert_eq!(catalog.filtered(None).len(), 4);
    }

    #[test]
    fn duplicate_names_are_reported_once() {
        let catalog = BreedCatalog::new(vec![
            Breed::new("1", "Gir", BreedType::Cattle),
            Breed::new("2", "gir ", BreedType::Cattle),
            Breed::new("3", "gir ", BreedType::Cattle),
            Breed::new("4", "Murrah", BreedType::Buffalo),
        ]);
        assert_eq!(catalog.duplicate_names(), vec!["gir ".to_string()]);
        assert_eq!(catalog.find_exact("GIR").map(|b| b.id.as_str()), Some("1"));
    }

    #[test]
    fn prompt_listing_truncates_descriptions() {
        let listing = catalog().prompt_listing();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines[0], "Sahiwal (cattle) - Punjab dairy breed");
        assert_eq!(lines[1], "Red Sindhi (cattle) -");
        assert_eq!(lines[2], format!("Murrah (buffalo) - {}", "x".repeat(100)));
    }
}
