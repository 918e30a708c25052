use crate::config::FeedConfig;
use crate::models::{BundleKind, CanonicalBundle, Category, CategoryFeed};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

const FEED_TTL_MINUTES: u32 = 60;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot render {category} feed: {message}")]
    Render { category: Category, message: String },
}

#[async_trait]
pub trait FeedSink: Send + Sync {
    async fn publish(&self, feed: &CategoryFeed) -> Result<(), FeedError>;
}

/// Writes `<output_dir>/<category>.rss`, replacing the previous file in one
/// rename so readers never see a half-written feed.
#[derive(Debug, Clone)]
pub struct RssFeedWriter {
    config: FeedConfig,
}

impl RssFeedWriter {
    pub fn new(config: FeedConfig) -> Self {
        Self { config }
    }

    pub fn path_for(&self, category: Category) -> PathBuf {
        self.config
            .output_dir
            .join(format!("{}.rss", category.as_str()))
    }

    pub fn render(&self, feed: &CategoryFeed, now: DateTime<Utc>) -> Result<String, FeedError> {
        let items = feed
            .bundles
            .iter()
            .filter(|bundle| bundle.is_valid())
            .collect::<Vec<_>>();
        if items.is_empty() {
            return Err(FeedError::Render {
                category: feed.category,
                message: "no publishable items".to_string(),
            });
        }

        let cfg = &self.config;
        let category = feed.category;
        let title = format!("{} {} Bundles", cfg.title_prefix, category.label());
        let link = absolute_url_with(
            &cfg.site_url,
            &format!("/{}/bundle/{}", cfg.locale, category.as_str()),
        );
        let description = format!(
            "Current {} bundles from {} - Automatically generated",
            category.label().to_lowercase(),
            cfg.title_prefix
        );

        let mut out = String::with_capacity(1024 + items.len() * 1024);
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str("<rss version=\"2.0\">\n  <channel>\n");
        push_element(&mut out, 4, "title", &title);
        push_element(&mut out, 4, "link", &link);
        push_element(&mut out, 4, "description", &description);
        push_element(&mut out, 4, "language", &cfg.language);
        push_element(&mut out, 4, "lastBuildDate", &now.to_rfc2822());
        push_element(&mut out, 4, "category", channel_category(category));
        push_element(&mut out, 4, "generator", env!("CARGO_PKG_NAME"));
        push_element(&mut out, 4, "ttl", &FEED_TTL_MINUTES.to_string());

        for bundle in items {
            self.push_item(&mut out, bundle, &link, now);
        }

        out.push_str("  </channel>\n</rss>\n");
        Ok(out)
    }

    fn push_item(&self, out: &mut String, bundle: &CanonicalBundle, feed_link: &str, now: DateTime<Utc>) {
        let link = absolute_url_with(&self.config.site_url, &bundle.url);
        let guid = format!(
            "{}-{}-bundle-{}",
            self.config.title_prefix.to_lowercase().replace(' ', "-"),
            bundle.category.as_str(),
            bundle.id
        );
        let published = bundle.valid_from.unwrap_or(now);

        out.push_str("    <item>\n");
        push_element(out, 6, "title", &bundle.title);
        push_element(out, 6, "link", &link);
        push_element(out, 6, "description", &item_description(bundle, &link));
        push_element(out, 6, "category", item_genre(bundle));
        out.push_str(&format!(
            "      <guid isPermaLink=\"false\">{}</guid>\n",
            escape_xml(&guid)
        ));
        push_element(out, 6, "pubDate", &published.to_rfc2822());
        if let Some(image) = bundle.image.as_deref().filter(|i| !i.trim().is_empty()) {
            out.push_str(&format!(
                "      <enclosure url=\"{}\" length=\"0\" type=\"{}\"/>\n",
                escape_xml(&absolute_url_with(&self.config.site_url, image)),
                image_mime(image)
            ));
        }
        push_element(out, 6, "source", feed_link);
        out.push_str("    </item>\n");
    }

    pub fn render_index(&self, feeds: &[CategoryFeed], now: DateTime<Utc>) -> String {
        let cfg = &self.config;
        let title = format!("{} RSS Feeds", cfg.title_prefix);
        let lang = cfg.language.split('-').next().unwrap_or("en");

        let mut html = String::with_capacity(2048);
        html.push_str("<!DOCTYPE html>\n");
        html.push_str(&format!("<html lang=\"{}\">\n<head>\n", escape_xml(lang)));
        html.push_str("  <meta charset=\"UTF-8\">\n");
        html.push_str("  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
        html.push_str(&format!("  <title>{}</title>\n", escape_xml(&title)));
        for feed in feeds {
            html.push_str(&format!(
                "  <link rel=\"alternate\" type=\"application/rss+xml\" title=\"{} {} Bundles\" href=\"{}.rss\">\n",
                escape_xml(&cfg.title_prefix),
                feed.category.label(),
                feed.category.as_str()
            ));
        }
        html.push_str("</head>\n<body>\n");
        html.push_str(&format!("  <h1>{}</h1>\n", escape_xml(&title)));
        html.push_str("  <ul>\n");
        for feed in feeds {
            let status = if feed.is_placeholder_only() {
                "no active bundles".to_string()
            } else {
                format!("{} active bundles", feed.bundles.len())
            };
            html.push_str(&format!(
                "    <li><a href=\"{}.rss\">{} {} Bundles</a> ({status})</li>\n",
                feed.category.as_str(),
                escape_xml(&cfg.title_prefix),
                feed.category.label()
            ));
        }
        html.push_str("  </ul>\n");
        html.push_str(&format!(
            "  <p>Last updated {}. Not affiliated with {}.</p>\n",
            now.format("%Y-%m-%d %H:%M UTC"),
            escape_xml(&cfg.title_prefix)
        ));
        html.push_str("</body>\n</html>\n");
        html
    }

    pub async fn write_index(&self, feeds: &[CategoryFeed]) -> Result<PathBuf, FeedError> {
        let path = self.config.output_dir.join("index.html");
        let page = self.render_index(feeds, Utc::now());
        self.write_atomic(&path, page.as_bytes()).await?;
        info!(target = "bundles.feed", path = %path.display(), feeds = feeds.len(), "index_written");
        Ok(path)
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), FeedError> {
        let io_err = |source| FeedError::Io {
            path: path.display().to_string(),
            source,
        };
        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(io_err)?;
        let mut staging = path.as_os_str().to_owned();
        staging.push(".tmp");
        tokio::fs::write(&staging, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&staging, path).await.map_err(io_err)
    }
}

#[async_trait]
impl FeedSink for RssFeedWriter {
    async fn publish(&self, feed: &CategoryFeed) -> Result<(), FeedError> {
        let document = self.render(feed, Utc::now())?;
        let path = self.path_for(feed.category);
        self.write_atomic(&path, document.as_bytes()).await?;

        info!(
            target = "bundles.feed",
            category = feed.category.as_str(),
            items = feed.bundles.len(),
            placeholder = feed.is_placeholder_only(),
            path = %path.display(),
            "feed_written"
        );
        Ok(())
    }
}

pub fn absolute_url_with(site: &str, url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    if let Some(rest) = url.strip_prefix("//") {
        return format!("https://{rest}");
    }
    format!(
        "{}/{}",
        site.trim_end_matches('/'),
        url.trim_start_matches('/')
    )
}

pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // not representable in XML 1.0
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

fn push_element(out: &mut String, indent: usize, name: &str, text: &str) {
    out.push_str(&format!(
        "{:indent$}<{name}>{}</{name}>\n",
        "",
        escape_xml(text)
    ));
}

fn channel_category(category: Category) -> &'static str {
    match category {
        Category::Games => "Gaming",
        Category::Books => "Books & Literature",
        Category::Software => "Software & Technology",
        Category::Unclassified => "Technology",
    }
}

const GAME_GENRES: &[(&str, &str)] = &[
    ("roguelike", "Roguelike"),
    ("platformer", "Platformer"),
    ("shooter", "Shooter"),
    ("strategy", "Strategy"),
    ("simulation", "Simulation"),
    ("horror", "Horror"),
    ("puzzle", "Puzzle"),
    ("racing", "Racing"),
    ("sports", "Sports"),
    ("adventure", "Adventure"),
    ("action", "Action"),
    ("rpg", "RPG"),
    ("indie", "Indie Games"),
];

const BOOK_GENRES: &[(&str, &str)] = &[
    ("sci-fi", "Science Fiction"),
    ("fantasy", "Fantasy"),
    ("mystery", "Mystery"),
    ("romance", "Romance"),
    ("thriller", "Thriller"),
    ("biography", "Biography"),
    ("history", "History"),
    ("programming", "Programming"),
    ("business", "Business"),
    ("self-help", "Self Help"),
    ("cooking", "Cooking"),
    ("fiction", "Fiction"),
    ("tech", "Technology"),
    ("art", "Art"),
];

const SOFTWARE_GENRES: &[(&str, &str)] = &[
    ("game", "Game Development"),
    ("animation", "Animation"),
    ("3d", "3D Software"),
    ("photo", "Photo Editing"),
    ("video", "Video Editing"),
    ("audio", "Audio Production"),
    ("creative", "Creative Software"),
    ("design", "Design"),
    ("productivity", "Productivity"),
    ("office", "Office Software"),
    ("security", "Security"),
    ("utility", "Utilities"),
    ("development", "Development Tools"),
    ("programming", "Programming"),
];

/// Per-item `<category>`: first genre keyword found in the title, else the
/// channel category.
fn item_genre(bundle: &CanonicalBundle) -> &'static str {
    let genres = match bundle.category {
        Category::Games => GAME_GENRES,
        Category::Books => BOOK_GENRES,
        Category::Software => SOFTWARE_GENRES,
        Category::Unclassified => &[],
    };
    let title = bundle.title.to_lowercase();
    genres
        .iter()
        .find(|(keyword, _)| title.contains(keyword))
        .map(|(_, genre)| *genre)
        .unwrap_or_else(|| channel_category(bundle.category))
}

fn kind_label(kind: BundleKind) -> &'static str {
    match kind {
        BundleKind::Bundle => "Bundle",
        BundleKind::PickAndMix => "Pick & Mix",
        BundleKind::StarDeal => "Star Deal",
        BundleKind::Giveaway => "Free Giveaway",
        BundleKind::Voucher => "Voucher",
        BundleKind::Placeholder => "Notice",
    }
}

fn item_description(bundle: &CanonicalBundle, link: &str) -> String {
    if bundle.is_placeholder() {
        return bundle.description.clone();
    }
    let mut html = String::from("<div>");
    if let Some(image) = bundle.image.as_deref().filter(|i| !i.trim().is_empty()) {
        html.push_str(&format!(
            "<img src=\"{}\" alt=\"{}\" style=\"max-width: 300px; height: auto;\" />",
            escape_xml(image),
            escape_xml(&bundle.title)
        ));
    }
    html.push_str(&format!("<h3>{}</h3>", escape_xml(&bundle.title)));
    html.push_str(&format!("<p>{}</p>", escape_xml(&bundle.description)));
    html.push_str(&format!(
        "<p><strong>Type:</strong> {}</p>",
        kind_label(bundle.kind)
    ));
    if let Some(until) = bundle.valid_until {
        html.push_str(&format!(
            "<p><strong>Ends:</strong> {}</p>",
            until.format("%Y-%m-%d %H:%M UTC")
        ));
    }
    html.push_str(&format!(
        "<p><a href=\"{}\">View Bundle</a></p></div>",
        escape_xml(link)
    ));
    html
}

fn image_mime(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else {
        "image/jpeg"
    }
}
