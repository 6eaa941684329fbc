//! String similarity used by entity linking
//!
//! Character-level similarity is normalized Levenshtein from `strsim`. The
//! structural checks (abbreviation, nickname, technical fold) are cheap
//! string predicates applied after fuzzy matching fails.

use strsim::normalized_levenshtein;

use super::entity::Entity;

/// Score given to an abbreviation match ("JS" for "JavaScript")
pub const ABBREVIATION_SCORE: f64 = 0.85;
/// Score given to a nickname match ("Bob Smith" for "Robert Smith")
pub const NICKNAME_SCORE: f64 = 0.8;
/// Score given to a technical fold match ("Node.js" for "NodeJS")
pub const TECHNICAL_VARIATION_SCORE: f64 = 0.9;

/// Common given-name nicknames, (nickname, formal)
const NICKNAMES: &[(&str, &str)] = &[
    ("al", "albert"),
    ("alex", "alexander"),
    ("alex", "alexandra"),
    ("andy", "andrew"),
    ("ben", "benjamin"),
    ("beth", "elizabeth"),
    ("bill", "william"),
    ("bob", "robert"),
    ("bobby", "robert"),
    ("chris", "christopher"),
    ("chris", "christine"),
    ("dan", "daniel"),
    ("danny", "daniel"),
    ("dave", "david"),
    ("ed", "edward"),
    ("jim", "james"),
    ("jimmy", "james"),
    ("joe", "joseph"),
    ("johnny", "john"),
    ("jack", "john"),
    ("kate", "katherine"),
    ("katie", "katherine"),
    ("liz", "elizabeth"),
    ("matt", "matthew"),
    ("mike", "michael"),
    ("nick", "nicholas"),
    ("pat", "patrick"),
    ("pat", "patricia"),
    ("peggy", "margaret"),
    ("rick", "richard"),
    ("dick", "richard"),
    ("rob", "robert"),
    ("sam", "samuel"),
    ("sam", "samantha"),
    ("steve", "stephen"),
    ("steve", "steven"),
    ("sue", "susan"),
    ("tom", "thomas"),
    ("tony", "anthony"),
    ("will", "william"),
];

/// Normalized edit-distance similarity of two names, in [0, 1]
pub fn name_similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(&Entity::normalize(a), &Entity::normalize(b))
}

/// Split a name into words on whitespace, punctuation and camelCase humps
pub fn split_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in name.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_numeric();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Initial letters of each word, lowercased
pub fn initials(name: &str) -> String {
    split_words(name)
        .iter()
        .filter_map(|w| w.chars().next())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether `candidate` reads as an abbreviation of the multi-word `name`
pub fn is_abbreviation_of(candidate: &str, name: &str) -> bool {
    let letters: String = candidate
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();

    if letters.len() < 2 || candidate.split_whitespace().count() > 1 {
        return false;
    }
    if split_words(name).len() < 2 {
        return false;
    }
    letters == initials(name)
}

fn nickname_equivalent(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    NICKNAMES
        .iter()
        .any(|(nick, formal)| (*nick == a && *formal == b) || (*nick == b && *formal == a))
}

/// Whether two person names differ only by a nickname on the first token
pub fn is_nickname_of(candidate: &str, name: &str) -> bool {
    let candidate = Entity::normalize(candidate);
    let name = Entity::normalize(name);
    if candidate == name {
        return false;
    }

    let mut candidate_tokens = candidate.split(' ');
    let mut name_tokens = name.split(' ');
    let (Some(first_candidate), Some(first_name)) = (candidate_tokens.next(), name_tokens.next())
    else {
        return false;
    };

    nickname_equivalent(first_candidate, first_name) && candidate_tokens.eq(name_tokens)
}

/// Case and punctuation fold for technical names
///
/// "Node.js", "NodeJS" and "node" all fold to "node". `+` and `#` survive so
/// "C++" and "C#" stay apart.
pub fn technical_fold(name: &str) -> String {
    let folded: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '+' || *c == '#')
        .flat_map(char::to_lowercase)
        .collect();

    match folded.strip_suffix("js") {
        Some(stem) if stem.chars().count() >= 2 => stem.to_string(),
        _ => folded,
    }
}

/// Whether two technical names are the same after folding
pub fn is_technical_variation(candidate: &str, name: &str) -> bool {
    let a = technical_fold(candidate);
    !a.is_empty() && a == technical_fold(name)
}
