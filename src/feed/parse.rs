// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use url::Url;

use crate::error::ParseError;

use super::model::{Enclosure, Episode, Feed};

/// Parse a feed document into a Feed and its Episodes.
///
/// The document is tried as RSS 2.0 first; when the root element is not
/// `<rss>` the Atom parser takes over. Items and entries without a
/// resolvable media link are dropped individually, never failing the
/// whole document.
pub fn parse_feed(bytes: &[u8], feed_url: &Url) -> Result<(Feed, Vec<Episode>), ParseError> {
    match rss::Channel::read_from(bytes) {
        Ok(channel) => Ok(parse_rss(&channel, feed_url)),
        Err(rss::Error::InvalidStartTag) => parse_atom(bytes, feed_url),
        Err(e) => Err(ParseError::InvalidXml {
            url: feed_url.to_string(),
            message: e.to_string(),
        }),
    }
}

fn parse_rss(channel: &rss::Channel, feed_url: &Url) -> (Feed, Vec<Episode>) {
    let feed = Feed {
        key: feed_url.clone(),
        title: non_empty(channel.title()).unwrap_or_else(|| "Untitled".to_string()),
        description: non_empty(channel.description()),
        link: Url::parse(channel.link()).ok(),
        last_build_date: channel.last_build_date().and_then(parse_date),
        copyright: channel.copyright().and_then(non_empty),
    };

    let episodes = channel
        .items()
        .iter()
        .filter_map(|item| parse_rss_item(feed_url, item))
        .collect();

    (feed, episodes)
}

fn parse_rss_item(feed_key: &Url, item: &rss::Item) -> Option<Episode> {
    // Enclosure strategies, tried in order
    let enclosure = rss_enclosure(item).or_else(|| rss_media_content(item))?;

    Some(Episode {
        feed_key: feed_key.clone(),
        title: item
            .title()
            .and_then(non_empty)
            .unwrap_or_else(|| "Untitled".to_string()),
        description: rss_description(item),
        link: item.link().and_then(|l| Url::parse(l).ok()),
        enclosure,
        pub_date: item.pub_date().and_then(parse_date),
        copyright: None,
        played: false,
        progress_ms: 0,
    })
}

/// Standard `<enclosure url=...>` tag
fn rss_enclosure(item: &rss::Item) -> Option<Enclosure> {
    let enclosure = item.enclosure()?;
    let url = Url::parse(enclosure.url()).ok()?;

    Some(Enclosure {
        url,
        length: enclosure.length().parse().ok(),
        mime_type: non_empty(enclosure.mime_type()),
    })
}

/// `media:content` extension carried directly on the item
fn rss_media_content(item: &rss::Item) -> Option<Enclosure> {
    let contents = item.extensions().get("media")?.get("content")?;

    contents.iter().find_map(|ext| {
        let url = ext.attrs().get("url").and_then(|u| Url::parse(u).ok())?;
        Some(Enclosure {
            url,
            length: ext.attrs().get("fileSize").and_then(|s| s.parse().ok()),
            mime_type: ext.attrs().get("type").cloned(),
        })
    })
}

/// Item description, preferring the full `content:encoded` body
fn rss_description(item: &rss::Item) -> Option<String> {
    item.content()
        .and_then(non_empty)
        .or_else(|| item.description().and_then(non_empty))
        .or_else(|| {
            item.itunes_ext()
                .and_then(|ext| ext.summary())
                .and_then(non_empty)
        })
}

fn parse_atom(bytes: &[u8], feed_url: &Url) -> Result<(Feed, Vec<Episode>), ParseError> {
    let source = match atom_syndication::Feed::read_from(bytes) {
        Ok(source) => source,
        Err(atom_syndication::Error::InvalidStartTag) => {
            return Err(ParseError::UnrecognizedFormat {
                url: feed_url.to_string(),
            });
        }
        Err(e) => {
            return Err(ParseError::InvalidXml {
                url: feed_url.to_string(),
                message: e.to_string(),
            });
        }
    };

    let feed = Feed {
        key: feed_url.clone(),
        title: non_empty(&source.title().to_string())
            .unwrap_or_else(|| "Untitled".to_string()),
        description: source
            .subtitle()
            .and_then(|t| non_empty(&t.to_string())),
        link: atom_feed_link(&source),
        last_build_date: Some(*source.updated()),
        copyright: source.rights().and_then(|t| non_empty(&t.to_string())),
    };

    let episodes = source
        .entries()
        .iter()
        .filter_map(|entry| parse_atom_entry(feed_url, entry))
        .collect();

    Ok((feed, episodes))
}

/// Feed link, preferring `rel="alternate"` with `rel="self"` as fallback
fn atom_feed_link(feed: &atom_syndication::Feed) -> Option<Url> {
    let links = feed.links();
    links
        .iter()
        .find(|l| link_rel(l) == "alternate")
        .or_else(|| links.iter().find(|l| link_rel(l) == "self"))
        .and_then(|l| Url::parse(l.href()).ok())
}

fn parse_atom_entry(feed_key: &Url, entry: &atom_syndication::Entry) -> Option<Episode> {
    // Enclosure strategies, tried in order: the standard enclosure link
    // relation, then the media extension used by media-channel feeds,
    // then a YouTube video id rewritten to a watch URL.
    let enclosure = atom_link_enclosure(entry)
        .or_else(|| atom_media_content(entry))
        .or_else(|| atom_video_id_enclosure(entry))?;

    let description = entry
        .content()
        .and_then(|c| c.value())
        .and_then(non_empty)
        .or_else(|| entry.summary().and_then(|t| non_empty(&t.to_string())))
        .or_else(|| atom_media_description(entry));

    Some(Episode {
        feed_key: feed_key.clone(),
        title: non_empty(&entry.title().to_string())
            .unwrap_or_else(|| "Untitled".to_string()),
        description,
        link: entry
            .links()
            .iter()
            .find(|l| link_rel(l) == "alternate")
            .and_then(|l| Url::parse(l.href()).ok()),
        enclosure,
        pub_date: Some(entry.published().copied().unwrap_or(*entry.updated())),
        copyright: entry.rights().and_then(|t| non_empty(&t.to_string())),
        played: false,
        progress_ms: 0,
    })
}

/// `<link rel="enclosure" href=...>`
fn atom_link_enclosure(entry: &atom_syndication::Entry) -> Option<Enclosure> {
    let link = entry.links().iter().find(|l| link_rel(l) == "enclosure")?;
    let url = Url::parse(link.href()).ok()?;

    Some(Enclosure {
        url,
        length: link.length().and_then(|l| l.parse().ok()),
        mime_type: link.mime_type().map(String::from),
    })
}

/// `media:group`/`media:content`, as used by YouTube channel feeds
fn atom_media_content(entry: &atom_syndication::Entry) -> Option<Enclosure> {
    let group = entry.extensions().get("media")?.get("group")?.first()?;
    let contents = group.children().get("content")?;

    contents.iter().find_map(|ext| {
        let url = ext.attrs().get("url").and_then(|u| Url::parse(u).ok())?;
        Some(Enclosure {
            url,
            length: None,
            mime_type: ext.attrs().get("type").cloned(),
        })
    })
}

/// `yt:videoId`, rewritten to a watch URL when no media content is given
fn atom_video_id_enclosure(entry: &atom_syndication::Entry) -> Option<Enclosure> {
    let video_id = entry
        .extensions()
        .get("yt")?
        .get("videoId")?
        .first()?
        .value()?;
    let url = Url::parse(&format!("https://www.youtube.com/watch?v={video_id}")).ok()?;

    Some(Enclosure {
        url,
        length: None,
        mime_type: None,
    })
}

fn atom_media_description(entry: &atom_syndication::Entry) -> Option<String> {
    let group = entry.extensions().get("media")?.get("group")?.first()?;
    let description = group.children().get("description")?.first()?;
    description.value().and_then(non_empty)
}

fn link_rel(link: &atom_syndication::Link) -> &str {
    let rel = link.rel();
    if rel.is_empty() { "alternate" } else { rel }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse feed dates, tolerating the format drift seen in the wild
fn parse_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let s = date_str.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }

    const OFFSET_FORMATS: [&str; 2] = ["%a, %d %b %Y %H:%M:%S %z", "%Y-%m-%d %H:%M:%S %z"];
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }

    // Naive formats are taken as UTC
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc().fixed_offset())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Test Podcast</title>
    <description>A test podcast for unit testing</description>
    <link>https://example.com</link>
    <lastBuildDate>Mon, 01 Jan 2024 12:00:00 +0000</lastBuildDate>
    <copyright>2024 Example</copyright>
    <item>
      <title>Episode 1</title>
      <description>First episode</description>
      <link>https://example.com/ep1</link>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/ep1.mp3" length="1234567" type="audio/mpeg"/>
    </item>
    <item>
      <title>Episode 2</title>
      <enclosure url="https://example.com/ep2.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>No Audio</title>
      <description>An item without any media link</description>
    </item>
  </channel>
</rss>"#;

    fn feed_url() -> Url {
        Url::parse("https://example.com/feed.xml").unwrap()
    }

    #[test]
    fn rss_feed_key_is_the_requested_url() {
        let (feed, _) = parse_feed(SAMPLE_RSS.as_bytes(), &feed_url()).unwrap();

        assert_eq!(feed.key, feed_url());
        assert_eq!(feed.title, "Test Podcast");
        assert_eq!(
            feed.description,
            Some("A test podcast for unit testing".to_string())
        );
        assert_eq!(feed.copyright, Some("2024 Example".to_string()));
        assert!(feed.last_build_date.is_some());
    }

    #[test]
    fn rss_episodes_carry_enclosure_and_metadata() {
        let (_, episodes) = parse_feed(SAMPLE_RSS.as_bytes(), &feed_url()).unwrap();

        assert_eq!(episodes.len(), 2);

        let ep1 = &episodes[0];
        assert_eq!(ep1.title, "Episode 1");
        assert_eq!(ep1.feed_key, feed_url());
        assert_eq!(ep1.enclosure.url.as_str(), "https://example.com/ep1.mp3");
        assert_eq!(ep1.enclosure.length, Some(1234567));
        assert_eq!(ep1.enclosure.mime_type, Some("audio/mpeg".to_string()));
        assert!(ep1.pub_date.is_some());
        assert!(!ep1.played);
        assert_eq!(ep1.progress_ms, 0);
    }

    #[test]
    fn rss_missing_optional_fields_do_not_fail_the_item() {
        let (_, episodes) = parse_feed(SAMPLE_RSS.as_bytes(), &feed_url()).unwrap();

        let ep2 = &episodes[1];
        assert_eq!(ep2.title, "Episode 2");
        assert!(ep2.pub_date.is_none());
        assert!(ep2.description.is_none());
        assert!(ep2.enclosure.length.is_none());
    }

    #[test]
    fn rss_items_without_media_link_are_dropped() {
        let (_, episodes) = parse_feed(SAMPLE_RSS.as_bytes(), &feed_url()).unwrap();

        assert!(episodes.iter().all(|e| e.title != "No Audio"));
    }

    #[test]
    fn rss_media_content_serves_as_enclosure_fallback() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Media Feed</title>
    <description>Feed using media extensions</description>
    <item>
      <title>Media Episode</title>
      <media:content url="https://example.com/clip.mp4" type="video/mp4" fileSize="4096"/>
    </item>
  </channel>
</rss>"#;

        let (_, episodes) = parse_feed(xml.as_bytes(), &feed_url()).unwrap();

        assert_eq!(episodes.len(), 1);
        assert_eq!(
            episodes[0].enclosure.url.as_str(),
            "https://example.com/clip.mp4"
        );
        assert_eq!(episodes[0].enclosure.length, Some(4096));
        assert_eq!(episodes[0].enclosure.mime_type, Some("video/mp4".to_string()));
    }

    #[test]
    fn rss_description_prefers_content_encoded() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Feed</title>
    <description>d</description>
    <item>
      <title>Ep</title>
      <description>short</description>
      <content:encoded>full body</content:encoded>
      <enclosure url="https://example.com/ep.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

        let (_, episodes) = parse_feed(xml.as_bytes(), &feed_url()).unwrap();

        assert_eq!(episodes[0].description, Some("full body".to_string()));
    }

    const SAMPLE_ATOM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Cast</title>
  <subtitle>An atom test feed</subtitle>
  <link rel="alternate" href="https://example.com/"/>
  <link rel="self" href="https://example.com/atom.xml"/>
  <updated>2024-02-01T08:00:00Z</updated>
  <rights>CC-BY</rights>
  <id>urn:uuid:feed</id>
  <entry>
    <title>Entry 1</title>
    <id>urn:uuid:entry1</id>
    <updated>2024-02-01T08:00:00Z</updated>
    <published>2024-01-31T20:00:00Z</published>
    <link rel="alternate" href="https://example.com/entry1"/>
    <link rel="enclosure" href="https://example.com/entry1.mp3" type="audio/mpeg" length="2048"/>
    <summary>First entry</summary>
  </entry>
  <entry>
    <title>Entry Without Media</title>
    <id>urn:uuid:entry2</id>
    <updated>2024-02-01T08:00:00Z</updated>
    <link rel="alternate" href="https://example.com/entry2"/>
  </entry>
</feed>"#;

    #[test]
    fn atom_feed_metadata_is_extracted() {
        let (feed, _) = parse_feed(SAMPLE_ATOM.as_bytes(), &feed_url()).unwrap();

        assert_eq!(feed.key, feed_url());
        assert_eq!(feed.title, "Atom Cast");
        assert_eq!(feed.description, Some("An atom test feed".to_string()));
        assert_eq!(feed.link.as_ref().map(Url::as_str), Some("https://example.com/"));
        assert_eq!(feed.copyright, Some("CC-BY".to_string()));
        assert!(feed.last_build_date.is_some());
    }

    #[test]
    fn atom_enclosure_link_becomes_episode() {
        let (_, episodes) = parse_feed(SAMPLE_ATOM.as_bytes(), &feed_url()).unwrap();

        assert_eq!(episodes.len(), 1);
        let ep = &episodes[0];
        assert_eq!(ep.title, "Entry 1");
        assert_eq!(ep.enclosure.url.as_str(), "https://example.com/entry1.mp3");
        assert_eq!(ep.enclosure.length, Some(2048));
        assert_eq!(ep.link.as_ref().map(Url::as_str), Some("https://example.com/entry1"));
        assert_eq!(ep.description, Some("First entry".to_string()));
        // published is preferred over updated
        assert_eq!(
            ep.pub_date.map(|d| d.to_rfc3339()),
            Some("2024-01-31T20:00:00+00:00".to_string())
        );
    }

    #[test]
    fn youtube_style_entries_resolve_media_group() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:media="http://search.yahoo.com/mrss/" xmlns:yt="http://www.youtube.com/xml/schemas/2015">
  <title>Channel</title>
  <updated>2024-02-01T08:00:00Z</updated>
  <id>yt:channel:abc</id>
  <entry>
    <title>Video 1</title>
    <id>yt:video:one</id>
    <updated>2024-02-01T08:00:00Z</updated>
    <media:group>
      <media:content url="https://www.youtube.com/v/one" type="application/x-shockwave-flash"/>
      <media:description>A video description</media:description>
    </media:group>
  </entry>
  <entry>
    <title>Video 2</title>
    <id>yt:video:two</id>
    <updated>2024-02-01T08:00:00Z</updated>
    <yt:videoId>two</yt:videoId>
  </entry>
</feed>"#;

        let (_, episodes) = parse_feed(xml.as_bytes(), &feed_url()).unwrap();

        assert_eq!(episodes.len(), 2);
        assert_eq!(
            episodes[0].enclosure.url.as_str(),
            "https://www.youtube.com/v/one"
        );
        assert_eq!(
            episodes[0].description,
            Some("A video description".to_string())
        );
        assert_eq!(
            episodes[1].enclosure.url.as_str(),
            "https://www.youtube.com/watch?v=two"
        );
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let result = parse_feed(b"<rss><channel><title>Trunc", &feed_url());

        match result {
            Err(ParseError::InvalidXml { url, .. }) => {
                assert_eq!(url, "https://example.com/feed.xml");
            }
            other => panic!("Expected InvalidXml, got {other:?}"),
        }
    }

    #[test]
    fn unknown_root_element_is_unrecognized() {
        let result = parse_feed(b"<html><body>not a feed</body></html>", &feed_url());

        assert!(matches!(
            result,
            Err(ParseError::UnrecognizedFormat { .. })
        ));
    }

    #[test]
    fn date_parsing_tolerates_common_formats() {
        for input in [
            "Mon, 01 Jan 2024 12:00:00 +0000",
            "2024-01-01T12:00:00+00:00",
            "2024-01-01T12:00:00Z",
            "2024-01-01 12:00:00",
            "2024-01-01",
        ] {
            assert!(parse_date(input).is_some(), "failed to parse {input:?}");
        }

        assert!(parse_date("not a date").is_none());
        assert!(parse_date("").is_none());
    }
}
