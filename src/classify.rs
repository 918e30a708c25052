use crate::models::{Category, CanonicalBundle};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Source-supplied display type or category hint, compared whole.
    Hint,
    Title,
    TitleOrDescription,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Term {
    Contains(&'static str),
    /// Case-insensitive, bounded by non-alphanumeric characters.
    Word(&'static str),
    Exact(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub category: Category,
    pub field: Field,
    pub terms: &'static [Term],
    /// Title terms that veto this rule even when `terms` match.
    pub unless: &'static [Term],
}

const STRONG_GAMES: &[Term] = &[
    Term::Contains("game"),
    Term::Contains("gaming"),
    Term::Contains("rpg and fantasy"),
];

const BOOKS_LEXICON: &[Term] = &[
    Term::Contains("certification"),
    Term::Contains("learning"),
    Term::Contains("training"),
    Term::Contains("course"),
    Term::Contains("tabletop"),
    Term::Contains("comic"),
    Term::Contains("manga"),
    Term::Contains("book"),
    Term::Contains("development"),
    Term::Contains("programming"),
    Term::Contains("coding"),
    Term::Contains("security"),
    Term::Contains("cloud"),
    Term::Contains("network"),
    Term::Contains("robotics"),
    Term::Contains("python"),
    Term::Contains("graphics and design"),
    Term::Contains("business computing"),
    Term::Contains("digital life"),
    Term::Word("c#"),
];

const SOFTWARE_LEXICON: &[Term] = &[
    Term::Contains("software"),
    Term::Contains("excel"),
    Term::Contains("zenva"),
    Term::Contains("adobe"),
    Term::Contains("photoshop"),
    Term::Contains("productivity"),
    Term::Word("app"),
    Term::Word("apps"),
    Term::Word("office"),
];

pub const RULES: &[Rule] = &[
    Rule {
        name: "hint_books",
        category: Category::Books,
        field: Field::Hint,
        terms: &[
            Term::Exact("book-bundle"),
            Term::Exact("ebook-bundle"),
            Term::Exact("books"),
            Term::Exact("book"),
        ],
        unless: &[],
    },
    Rule {
        name: "hint_software",
        category: Category::Software,
        field: Field::Hint,
        terms: &[Term::Exact("software-bundle"), Term::Exact("software")],
        unless: &[],
    },
    Rule {
        name: "hint_games",
        category: Category::Games,
        field: Field::Hint,
        terms: &[
            Term::Exact("game-bundle"),
            Term::Exact("games"),
            Term::Exact("game"),
        ],
        unless: &[],
    },
    Rule {
        name: "books_lexicon",
        category: Category::Books,
        field: Field::Title,
        terms: BOOKS_LEXICON,
        unless: STRONG_GAMES,
    },
    Rule {
        name: "software_lexicon",
        category: Category::Software,
        field: Field::TitleOrDescription,
        terms: SOFTWARE_LEXICON,
        unless: STRONG_GAMES,
    },
];

const RESIDUAL: (Category, &str) = (Category::Games, "residual_games");

#[cfg(test)]
pub fn classify(bundle: &CanonicalBundle) -> Category {
    classify_with(RULES, bundle).0
}

/// Returns the category and the name of the rule that decided it.
pub fn classify_with(rules: &[Rule], bundle: &CanonicalBundle) -> (Category, &'static str) {
    let title = bundle.title.to_lowercase();
    let description = bundle.description.to_lowercase();
    let hints = [bundle.display_type.as_deref(), bundle.category_hint.as_deref()]
        .into_iter()
        .flatten()
        .map(|hint| hint.trim().to_lowercase())
        .filter(|hint| !hint.is_empty())
        .collect::<Vec<_>>();

    for rule in rules {
        let matched = match rule.field {
            Field::Hint => hints
                .iter()
                .any(|hint| rule.terms.iter().any(|term| term_matches(*term, hint, true))),
            Field::Title => any_term(rule.terms, &title),
            Field::TitleOrDescription => {
                any_term(rule.terms, &title) || any_term(rule.terms, &description)
            }
        };
        if matched && !any_term(rule.unless, &title) {
            return (rule.category, rule.name);
        }
    }
    RESIDUAL
}

pub fn apply(bundles: &mut [CanonicalBundle]) {
    for bundle in bundles.iter_mut() {
        let (category, rule) = classify_with(RULES, bundle);
        debug!(
            target = "bundles.classify",
            slug = %bundle.slug,
            category = category.as_str(),
            rule,
            "bundle_classified"
        );
        bundle.category = category;
    }
}

fn any_term(terms: &[Term], text: &str) -> bool {
    terms.iter().any(|term| term_matches(*term, text, false))
}

fn term_matches(term: Term, text: &str, whole_value: bool) -> bool {
    match term {
        Term::Contains(needle) => !whole_value && text.contains(needle),
        Term::Word(word) => !whole_value && contains_word(text, word),
        Term::Exact(value) => whole_value && text == value,
    }
}

fn contains_word(text: &str, word: &str) -> bool {
    text.match_indices(word).any(|(start, matched)| {
        let before = text[..start].chars().next_back();
        let after = text[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BundleKind, BundlePrice};

    fn bundle(title: &str) -> CanonicalBundle {
        CanonicalBundle {
            id: "id".into(),
            slug: "slug".into(),
            title: title.into(),
            description: String::new(),
            url: "/en/bundle/slug".into(),
            category: Category::Unclassified,
            kind: BundleKind::Bundle,
            source: None,
            valid_from: None,
            valid_until: None,
            price: BundlePrice {
                currency: "USD".into(),
                sale: 1.0,
                list: 2.0,
                discount: 50,
            },
            item_count: 0,
            active: true,
            image: None,
            tier: None,
            display_type: None,
            category_hint: None,
        }
    }

    #[test]
    fn games_terms_override_software_and_books_text() {
        assert_eq!(classify(&bundle("RPG and Fantasy Software Bundle")), Category::Games);
        assert_eq!(classify(&bundle("Game Development Course Bundle")), Category::Games);
    }

    #[test]
    fn software_lexicon_without_conflict() {
        assert_eq!(classify(&bundle("Pro Studio Software Bundle")), Category::Software);
        assert_eq!(classify(&bundle("Mobile App Toolkit")), Category::Software);
        // "app" only counts as a whole word
        assert_eq!(classify(&bundle("Happy Holidays Bundle")), Category::Games);
    }

    #[test]
    fn books_lexicon_beats_software_lexicon() {
        assert_eq!(
            classify(&bundle("Python Programming Software Collection")),
            Category::Books
        );
        assert_eq!(classify(&bundle("Cloud Certification Bundle")), Category::Books);
        assert_eq!(classify(&bundle("Tabletop Adventures")), Category::Books);
        assert_eq!(classify(&bundle("Learn C# Today")), Category::Books);
    }

    #[test]
    fn hint_short_circuits_text() {
        let mut b = bundle("Ultimate Game Dev Software Bundle");
        b.display_type = Some("Book-Bundle".into());
        assert_eq!(classify_with(RULES, &b), (Category::Books, "hint_books"));

        let mut b = bundle("Cyber Security Learning");
        b.category_hint = Some("software".into());
        assert_eq!(classify(&b), Category::Software);

        // a generic display type names no category
        let mut b = bundle("Pro Studio Software Bundle");
        b.display_type = Some("bundle".into());
        assert_eq!(classify(&b), Category::Software);
    }

    #[test]
    fn software_terms_in_description_count() {
        let mut b = bundle("Creator Essentials");
        b.description = "Bundle - includes desktop software licences".into();
        assert_eq!(classify(&b), Category::Software);
    }

    #[test]
    fn empty_title_is_residual_games() {
        assert_eq!(classify_with(RULES, &bundle("")), RESIDUAL);
    }

    #[test]
    fn classification_is_idempotent() {
        for title in [
            "RPG and Fantasy Software Bundle",
            "Pro Studio Software Bundle",
            "Comic Heroes",
            "Mystery Box",
            "",
        ] {
            let b = bundle(title);
            let first = classify(&b);
            let second = classify(&b);
            assert_eq!(first, second, "{title}");
            assert_ne!(first, Category::Unclassified);
        }
    }

    #[test]
    fn apply_sets_category_in_place() {
        let mut bundles = vec![bundle("Comic Heroes"), bundle("Action Pack")];
        apply(&mut bundles);
        assert_eq!(bundles[0].category, Category::Books);
        assert_eq!(bundles[1].category, Category::Games);
    }

    #[test]
    fn word_boundaries() {
        assert!(contains_word("best apps ever", "apps"));
        assert!(contains_word("app", "app"));
        assert!(!contains_word("apparel", "app"));
        assert!(contains_word("learn c#!", "c#"));
        assert!(!contains_word("abc# test", "c#"));
    }
}
