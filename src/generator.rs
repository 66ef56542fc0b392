//! Synthetic data generators for `{{$name}}` tokens.
//!
//! The registry is an ordinary value: the server builds one with
//! [`GeneratorRegistry::builtin`] at startup and shares it read-only. Tests
//! build their own and register extra entries without touching any global
//! state.
//!
//! Generator names are part of the template contract. Some of them carry
//! historical misspellings (`randomAlphaNumberic`, `randomCatchPhraceAdjective`,
//! `randomProduectCategory`); those stay, and correctly spelled aliases are
//! registered next to them.

use chrono::{SecondsFormat, Utc};
use fake::faker::address::en::{CityName, CountryCode, CountryName, StreetName};
use fake::faker::company::en::{
    Bs, Buzzword, BuzzwordMiddle, BuzzwordTail, CompanyName, CompanySuffix,
};
use fake::faker::creditcard::en::CreditCardNumber;
use fake::faker::currency::en::{CurrencyCode, CurrencyName};
use fake::faker::filesystem::en::FileExtension;
use fake::faker::internet::en::{
    DomainSuffix, MACAddress, Password, SafeEmail, UserAgent, Username, IPv4, IPv6,
};
use fake::faker::job::en::{Position as JobPosition, Title as JobTitle};
use fake::faker::lorem::en::{Paragraph, Paragraphs, Sentence, Sentences, Word, Words};
use fake::faker::name::en::{FirstName, LastName, Suffix, Title};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A zero-argument value producer.
pub type Generator = Arc<dyn Fn() -> String + Send + Sync>;

/// Name to generator mapping.
#[derive(Clone, Default)]
pub struct GeneratorRegistry {
    generators: HashMap<String, Generator>,
}

impl GeneratorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the full built-in catalog.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (name, generator) in BUILTIN {
            registry.register(*name, *generator);
        }
        registry
    }

    /// Add a generator, replacing any previous entry with the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, generator: F)
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.generators.insert(name.into(), Arc::new(generator));
    }

    /// Run the named generator.
    pub fn lookup(&self, name: &str) -> Option<String> {
        self.generators.get(name).map(|generator| generator())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.generators.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.generators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("generators", &self.names())
            .finish()
    }
}

const BUILTIN: &[(&str, fn() -> String)] = &[
    // common
    ("guid", guid),
    ("timestamp", unix_timestamp),
    ("isoTimestamp", iso_timestamp),
    // text, numbers and colors
    ("randomAlphaNumberic", alphanumeric),
    ("randomAlphaNumeric", alphanumeric),
    ("randomBoolean", boolean),
    ("randomInt", small_int),
    ("randomColor", color_name),
    ("randomHexColor", hex_color),
    ("randomAbbreviation", abbreviation),
    // internet
    ("randomIPV4", || IPv4().fake()),
    ("randomIPV6", || IPv6().fake()),
    ("randomMacAddress", || MACAddress().fake()),
    ("randomPassword", || Password(12..13).fake()),
    ("randomUserAgent", || UserAgent().fake()),
    ("randomSemver", semver),
    // names
    ("randomFirstName", || FirstName().fake()),
    ("randomLastName", || LastName().fake()),
    ("randomNamePrefix", || Title().fake()),
    ("randomNameSuffix", || Suffix().fake()),
    // profession
    ("randomJobTitle", || JobTitle().fake()),
    ("randomJobType", || JobPosition().fake()),
    // phone, address and location
    ("randomPhoneNumber", || PhoneNumber().fake()),
    ("randomCity", || CityName().fake()),
    ("randomStreetName", || StreetName().fake()),
    ("randomCountry", || CountryName().fake()),
    ("randomCountryCode", || CountryCode().fake()),
    ("randomLongitude", longitude),
    ("randomLatitude", latitude),
    // finance
    ("randomCreditCard", || CreditCardNumber().fake()),
    ("randomCurrencyCode", || CurrencyCode().fake()),
    ("randomCurrencyName", || CurrencyName().fake()),
    ("randomBitcoin", bitcoin_address),
    // business
    ("randomCompany", || CompanyName().fake()),
    ("randomCompanySuffix", || CompanySuffix().fake()),
    ("randomBs", || Bs().fake()),
    // catchphrases
    ("randomCatchPhrase", catch_phrase),
    ("randomCatchPhraceAdjective", || Buzzword().fake()),
    ("randomCatchPhraseAdjective", || Buzzword().fake()),
    ("randomCatchPhraseNoun", || BuzzwordTail().fake()),
    // domains, emails and usernames
    ("randomDomainName", domain_name),
    ("randomDomainSuffix", || DomainSuffix().fake()),
    ("randomEmail", || SafeEmail().fake()),
    ("randomUserName", || Username().fake()),
    ("randomUrl", url),
    // files
    ("randomFileExt", || FileExtension().fake()),
    // stores
    ("randomPrice", price),
    ("randomProduct", product),
    ("randomProductMaterial", || pick(MATERIALS)),
    ("randomProduectCategory", || pick(CATEGORIES)),
    ("randomProductCategory", || pick(CATEGORIES)),
    // grammar
    ("randomNoun", || pick(NOUNS)),
    ("randomVerb", || pick(VERBS)),
    ("randomIngverb", || pick(ING_VERBS)),
    ("randomAdjective", || pick(ADJECTIVES)),
    ("randomWord", word),
    ("randomWords", || sentence(20)),
    ("randomPhrase", || pick(PHRASES)),
    // lorem ipsum
    ("randomLoremWord", || Word().fake()),
    ("randomLoremWords", || Words(20..21).fake::<Vec<String>>().join(" ")),
    ("randomLoremSentence", || Sentence(8..16).fake()),
    ("randomLoremSentences", || Sentences(5..6).fake::<Vec<String>>().join(" ")),
    ("randomLoremParagraph", || Paragraph(5..6).fake()),
    ("randomLoremParagraphs", || Paragraphs(3..4).fake::<Vec<String>>().join("\n")),
    // host
    ("hostname", host_name),
    ("goos", || std::env::consts::OS.to_string()),
    ("goarch", || std::env::consts::ARCH.to_string()),
];

fn guid() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn unix_timestamp() -> String {
    Utc::now().timestamp().to_string()
}

fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn alphanumeric() -> String {
    let c = rand::thread_rng().sample(rand::distributions::Alphanumeric) as char;
    c.to_string()
}

fn boolean() -> String {
    rand::thread_rng().gen::<bool>().to_string()
}

fn small_int() -> String {
    rand::thread_rng().gen_range(0..=100).to_string()
}

fn hex_color() -> String {
    format!("#{:06x}", rand::thread_rng().gen_range(0..=0xff_ffffu32))
}

fn semver() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{}.{}.{}",
        rng.gen_range(0..10),
        rng.gen_range(0..20),
        rng.gen_range(0..20)
    )
}

fn longitude() -> String {
    format!("{:.6}", rand::thread_rng().gen_range(-180.0..=180.0f64))
}

fn latitude() -> String {
    format!("{:.6}", rand::thread_rng().gen_range(-90.0..=90.0f64))
}

fn price() -> String {
    format!("{:.2}", rand::thread_rng().gen_range(0.0..1000.0f64))
}

/// Legacy P2PKH (`1...`) or P2SH (`3...`) shaped address.
fn bitcoin_address() -> String {
    const BASE58: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let prefix = if rng.gen::<bool>() { '1' } else { '3' };
    let len = rng.gen_range(25..=33);
    std::iter::once(prefix)
        .chain((0..len).map(|_| BASE58[rng.gen_range(0..BASE58.len())] as char))
        .collect()
}

fn catch_phrase() -> String {
    format!(
        "{} {} {}",
        Buzzword().fake::<String>(),
        BuzzwordMiddle().fake::<String>(),
        BuzzwordTail().fake::<String>()
    )
}

fn domain_name() -> String {
    format!(
        "{}.{}",
        Word().fake::<String>(),
        DomainSuffix().fake::<String>()
    )
}

fn url() -> String {
    format!("https://www.{}/{}", domain_name(), Word().fake::<String>())
}

fn product() -> String {
    format!(
        "{} {} {}",
        pick(ADJECTIVES),
        pick(MATERIALS),
        pick(PRODUCTS)
    )
}

fn word() -> String {
    let pools: [&[&str]; 3] = [NOUNS, VERBS, ADJECTIVES];
    let mut rng = rand::thread_rng();
    let pool = pools[rng.gen_range(0..pools.len())];
    pick(pool)
}

fn sentence(words: usize) -> String {
    let mut sentence = (0..words).map(|_| word()).collect::<Vec<_>>().join(" ");
    if let Some(first) = sentence.get(..1) {
        let upper = first.to_uppercase();
        sentence.replace_range(..1, &upper);
    }
    sentence.push('.');
    sentence
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn color_name() -> String {
    pick(COLORS)
}

fn abbreviation() -> String {
    pick(ABBREVIATIONS)
}

fn pick(pool: &[&str]) -> String {
    pool.choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("mock")
        .to_string()
}

const COLORS: &[&str] = &[
    "red", "green", "blue", "yellow", "orange", "purple", "pink", "brown", "black", "white",
    "gray", "cyan", "magenta", "teal", "navy", "maroon", "olive", "lime", "indigo", "violet",
    "gold", "silver", "turquoise", "salmon", "plum", "orchid", "tan", "ivory", "azure", "lavender",
];

const ABBREVIATIONS: &[&str] = &[
    "ADP", "AGP", "AI", "API", "CSS", "EXE", "FTP", "GB", "HDD", "HTTP", "IB", "JBOD", "JSON",
    "PCI", "PNG", "RAM", "RSS", "SAS", "SCSI", "SDD", "SMS", "SMTP", "SQL", "SSL", "TCP", "THX",
    "USB", "XML", "XSS",
];

const MATERIALS: &[&str] = &[
    "Bamboo", "Bronze", "Concrete", "Cotton", "Fresh", "Frozen", "Granite", "Leather", "Marble",
    "Metal", "Plastic", "Rubber", "Soft", "Steel", "Wooden", "Glass", "Silk", "Wool", "Ceramic",
];

const CATEGORIES: &[&str] = &[
    "Automotive", "Baby", "Beauty", "Books", "Clothing", "Computers", "Electronics", "Games",
    "Garden", "Grocery", "Health", "Home", "Industrial", "Jewelry", "Kids", "Movies", "Music",
    "Outdoors", "Shoes", "Sports", "Tools", "Toys",
];

const PRODUCTS: &[&str] = &[
    "Bacon", "Ball", "Bike", "Car", "Chair", "Cheese", "Chicken", "Chips", "Computer", "Fish",
    "Gloves", "Hat", "Keyboard", "Mouse", "Pants", "Pizza", "Salad", "Sausages", "Shirt",
    "Shoes", "Soap", "Table", "Towels", "Tuna",
];

const NOUNS: &[&str] = &[
    "account", "anchor", "bridge", "bucket", "cable", "canvas", "circuit", "cluster", "compass",
    "driver", "engine", "feed", "firewall", "garden", "harbor", "interface", "ladder", "matrix",
    "monitor", "network", "orchard", "panel", "pixel", "protocol", "river", "sensor", "signal",
    "system", "tunnel", "window",
];

const VERBS: &[&str] = &[
    "back up", "bypass", "calculate", "compress", "connect", "copy", "generate", "hack", "index",
    "input", "navigate", "override", "parse", "program", "quantify", "reboot", "render",
    "synthesize", "transmit", "write",
];

const ING_VERBS: &[&str] = &[
    "backing up", "bypassing", "calculating", "compressing", "connecting", "copying",
    "generating", "hacking", "indexing", "navigating", "overriding", "parsing", "programming",
    "quantifying", "rebooting", "synthesizing", "transmitting",
];

const ADJECTIVES: &[&str] = &[
    "auxiliary", "awesome", "bluetooth", "cross-platform", "digital", "ergonomic", "fantastic",
    "generic", "handcrafted", "haptic", "intelligent", "mobile", "multi-byte", "neural",
    "online", "open-source", "optical", "primary", "redundant", "sleek", "solid-state",
    "virtual", "wireless",
];

const PHRASES: &[&str] = &[
    "a bird in the hand",
    "back to square one",
    "break the ice",
    "by the book",
    "call it a day",
    "cut to the chase",
    "hit the ground running",
    "in the same boat",
    "on the same page",
    "once in a blue moon",
    "the ball is in your court",
    "under the weather",
];
