//! The verified source registry (spec §6): a static table of known-good
//! external data sources, queryable by id/URL/category/provider/adapter so
//! scenario authors can discover a `bind` URL without guessing.

use once_cell::sync::Lazy;

#[derive(Debug, Clone)]
pub struct SourceRegistryEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub provider: &'static str,
    pub adapter: &'static str,
    pub category: &'static str,
    pub url: &'static str,
    pub fields: &'static [&'static str],
    pub geo: &'static [&'static str],
    pub refresh: &'static str,
    pub free: bool,
    pub api_key_required: bool,
    pub description: &'static str,
    pub last_verified: &'static str,
    pub example_bind: &'static str,
}

pub static VERIFIED_SOURCES: Lazy<Vec<SourceRegistryEntry>> = Lazy::new(|| {
    vec![
        SourceRegistryEntry {
            id: "eurostat-nrg-bal-c",
            name: "Eurostat energy balance (simplified)",
            provider: "Eurostat",
            adapter: "eurostat",
            category: "energy",
            url: "https://ec.europa.eu/eurostat/api/dissemination/statistics/1.0/data/nrg_bal_c",
            fields: &["mtoe", "ktoe"],
            geo: &["IT", "DE", "FR", "ES"],
            refresh: "annual",
            free: true,
            api_key_required: false,
            description: "National energy balance series, thousand tonnes of oil equivalent.",
            last_verified: "2026-01-15",
            example_bind: "bind energy_demand from \"https://ec.europa.eu/eurostat/api/dissemination/statistics/1.0/data/nrg_bal_c\" field: \"mtoe\"",
        },
        SourceRegistryEntry {
            id: "eurostat-demo-pjan",
            name: "Eurostat population on 1 January",
            provider: "Eurostat",
            adapter: "eurostat",
            category: "demographics",
            url: "https://ec.europa.eu/eurostat/api/dissemination/statistics/1.0/data/demo_pjan",
            fields: &["population"],
            geo: &["IT", "DE", "FR", "ES"],
            refresh: "annual",
            free: true,
            api_key_required: false,
            description: "Total resident population by country, 1 January of each year.",
            last_verified: "2026-01-15",
            example_bind: "bind population from \"https://ec.europa.eu/eurostat/api/dissemination/statistics/1.0/data/demo_pjan\"",
        },
        SourceRegistryEntry {
            id: "worldbank-gdp-growth",
            name: "World Bank GDP growth (annual %)",
            provider: "World Bank",
            adapter: "world_bank",
            category: "macroeconomics",
            url: "https://api.worldbank.org/v2/country/ITA/indicator/NY.GDP.MKTP.KD.ZG",
            fields: &["percent"],
            geo: &["ITA", "DEU", "FRA", "ESP", "USA"],
            refresh: "annual",
            free: true,
            api_key_required: false,
            description: "Annual GDP growth rate, indicator NY.GDP.MKTP.KD.ZG.",
            last_verified: "2026-01-15",
            example_bind: "bind gdp_growth from \"https://api.worldbank.org/v2/country/ITA/indicator/NY.GDP.MKTP.KD.ZG\"",
        },
        SourceRegistryEntry {
            id: "worldbank-inflation",
            name: "World Bank inflation, consumer prices (annual %)",
            provider: "World Bank",
            adapter: "world_bank",
            category: "macroeconomics",
            url: "https://api.worldbank.org/v2/country/ITA/indicator/FP.CPI.TOTL.ZG",
            fields: &["percent"],
            geo: &["ITA", "DEU", "FRA", "ESP", "USA"],
            refresh: "annual",
            free: true,
            api_key_required: false,
            description: "Annual consumer price inflation, indicator FP.CPI.TOTL.ZG.",
            last_verified: "2026-01-15",
            example_bind: "bind inflation_rate from \"https://api.worldbank.org/v2/country/ITA/indicator/FP.CPI.TOTL.ZG\"",
        },
        SourceRegistryEntry {
            id: "fallback-bundled",
            name: "Bundled offline series",
            provider: "sdl",
            adapter: "fallback",
            category: "misc",
            url: "sdl:fallback/",
            fields: &["inflation_rate", "gdp_growth"],
            geo: &["IT"],
            refresh: "static",
            free: true,
            api_key_required: false,
            description: "Historical series bundled with sdl-pulse for offline use and tests.",
            last_verified: "2026-01-15",
            example_bind: "bind inflation_rate from \"sdl:fallback/inflation_rate\"",
        },
    ]
});

pub fn find_by_id(id: &str) -> Option<&'static SourceRegistryEntry> {
    VERIFIED_SOURCES.iter().find(|e| e.id == id)
}

pub fn find_by_url(url: &str) -> Option<&'static SourceRegistryEntry> {
    VERIFIED_SOURCES.iter().find(|e| e.url == url)
}

pub fn by_category(category: &str) -> Vec<&'static SourceRegistryEntry> {
    VERIFIED_SOURCES.iter().filter(|e| e.category == category).collect()
}

pub fn by_provider(provider: &str) -> Vec<&'static SourceRegistryEntry> {
    VERIFIED_SOURCES.iter().filter(|e| e.provider == provider).collect()
}

pub fn by_adapter(adapter: &str) -> Vec<&'static SourceRegistryEntry> {
    VERIFIED_SOURCES.iter().filter(|e| e.adapter == adapter).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_entry_url_resolves_to_itself() {
        for entry in VERIFIED_SOURCES.iter() {
            assert_eq!(find_by_url(entry.url).map(|e| e.id), Some(entry.id));
        }
    }

    #[test]
    fn category_lookup_is_non_empty_for_known_categories() {
        assert!(!by_category("energy").is_empty());
        assert!(!by_category("macroeconomics").is_empty());
    }
}
