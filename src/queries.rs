use crate::config::AppConfig;

pub const SIGNATURE_SEPARATOR: &str = " || ";

/// Address fragments of one venue, as found in its row. Blank fragments are
/// ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryFragments<'a> {
    pub name: Option<&'a str>,
    pub address: &'a str,
    pub postal_code: &'a str,
    pub district: &'a str,
    pub country: &'a str,
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    city: String,
    default_country: String,
}

impl QueryBuilder {
    pub fn new(city: impl Into<String>, default_country: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            default_country: default_country.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.default_city, &config.default_country)
    }

    /// Search strings from most to least specific. Never empty.
    pub fn build(&self, fragments: &QueryFragments<'_>) -> Vec<String> {
        let name = fragments.name.unwrap_or_default();
        let country = if fragments.country.trim().is_empty() {
            self.default_country.as_str()
        } else {
            fragments.country
        };
        let has_street = !fragments.address.trim().is_empty();

        let mut queries = vec![join_fragments(&[
            name,
            fragments.address,
            fragments.postal_code,
            fragments.district,
            &self.city,
            country,
        ])];
        if has_street || !fragments.postal_code.trim().is_empty() {
            queries.push(join_fragments(&[
                fragments.address,
                fragments.postal_code,
                &self.city,
                country,
            ]));
        }
        if !has_street && !name.trim().is_empty() {
            queries.push(join_fragments(&[name, &self.city, country]));
        }

        let mut unique: Vec<String> = Vec::with_capacity(queries.len());
        for query in queries {
            if !query.is_empty() && !unique.contains(&query) {
                unique.push(query);
            }
        }
        if unique.is_empty() {
            unique.push(join_fragments(&[&self.city, country]));
        }
        unique
    }
}

/// Cache key for a whole candidate list.
pub fn signature(queries: &[String]) -> String {
    queries.join(SIGNATURE_SEPARATOR)
}

fn join_fragments(fragments: &[&str]) -> String {
    fragments
        .iter()
        .flat_map(|fragment| fragment.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}
