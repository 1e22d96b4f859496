//! End-to-end decoding tests.
//!
//! These tests drive the public `Decoder` API with hand-built `Sources`
//! values, covering merging, authorization, coercion and error policy.

use proptest::prelude::*;
use reqbind_core::{
    parse_text, BoxError, DecodeError, Decoder, DecoderConfig, FieldError, Fields, FileHandle,
    FileStream, Leaf, Location, ParseStage, PathSyntax, Record, Sources, TextDecoder, Upload,
};
use std::collections::BTreeSet;
use std::io::{self, Cursor, Read};

fn decoder(config: DecoderConfig) -> Decoder {
    Decoder::with_config(config).unwrap()
}

fn collecting() -> Decoder {
    decoder(DecoderConfig {
        collect_errors: true,
        ..DecoderConfig::default()
    })
}

fn strict() -> Decoder {
    decoder(DecoderConfig {
        ignore_unknown_keys: false,
        ..DecoderConfig::default()
    })
}

// ---------------------------------------------------------------------------
// Query values
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Counter {
    n: i32,
    ns: Vec<i32>,
}

impl Record for Counter {
    fn declare(fields: &mut Fields<Self>) {
        fields.scalar("n", |r| &mut r.n).locations(&[Location::Query]);
        fields.list("ns", |r| &mut r.ns).locations(&[Location::Query]);
    }
}

#[test]
fn test_scalar_last_value_wins() {
    let sources = Sources::new()
        .with(Location::Query, "n", "1")
        .with(Location::Query, "n", "2")
        .with(Location::Query, "ns", "1")
        .with(Location::Query, "ns", "2");

    let mut counter = Counter::default();
    Decoder::new().decode(&mut counter, sources).unwrap();

    assert_eq!(counter.n, 2);
    assert_eq!(counter.ns, vec![1, 2]);
}

#[test]
fn test_bracket_suffix_merges_with_plain_key() {
    let sources = Sources::new()
        .with(Location::Query, "ns", "1")
        .with(Location::Query, "ns[]", "2")
        .with(Location::Query, "ns[]", "3");

    let mut counter = Counter::default();
    Decoder::new().decode(&mut counter, sources).unwrap();

    assert_eq!(counter.ns, vec![1, 2, 3]);
}

#[derive(Debug, Default)]
struct Ids {
    ids: Vec<i64>,
}

impl Record for Ids {
    fn declare(fields: &mut Fields<Self>) {
        fields.list("ids", |r| &mut r.ids).locations(&[Location::Query]);
    }
}

#[test]
fn test_comma_joined_value_is_split() {
    let sources = Sources::new().with(Location::Query, "ids", "1,2,3");
    let mut ids = Ids::default();
    Decoder::new().decode(&mut ids, sources).unwrap();
    assert_eq!(ids.ids, vec![1, 2, 3]);
}

#[test]
fn test_whole_sequence_converter_is_not_split() {
    let decoder = Decoder::builder()
        .converter(|raw: &str| -> Result<Vec<i64>, BoxError> {
            Err(format!("cannot read {raw:?}").into())
        })
        .build()
        .unwrap();

    let sources = Sources::new().with(Location::Query, "ids", "1,2,3");
    let err = decoder.decode(&mut Ids::default(), sources).unwrap_err();

    let errors = err.field_errors().unwrap();
    assert_eq!(errors.len(), 1);
    let Some(FieldError::Conversion(conversion)) = errors.get("ids") else {
        panic!("conversion error expected");
    };
    assert_eq!(conversion.index(), None);
    assert!(conversion.type_name().ends_with("Vec<i64>"));
}

#[test]
fn test_split_can_be_disabled() {
    let decoder = decoder(DecoderConfig {
        list_delimiter: None,
        ..DecoderConfig::default()
    });
    let sources = Sources::new()
        .with(Location::Query, "ids", "7")
        .with(Location::Query, "ids", "1,2");

    let err = decoder.decode(&mut Ids::default(), sources).unwrap_err();
    let Some(FieldError::Conversion(conversion)) = err.field_errors().unwrap().get("ids") else {
        panic!("conversion error expected");
    };
    assert_eq!(conversion.index(), Some(1));
    assert_eq!(
        conversion.to_string(),
        "error converting value for index 1 of \"ids\". Details: invalid digit found in string"
    );
}

// ---------------------------------------------------------------------------
// Location authorization
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Authed {
    token: String,
    page: u32,
}

impl Record for Authed {
    fn declare(fields: &mut Fields<Self>) {
        fields
            .scalar("token", |r| &mut r.token)
            .locations(&[Location::Header]);
        fields.scalar("page", |r| &mut r.page).locations(&[Location::Query]);
    }
}

#[test]
fn test_location_error_with_collect_errors() {
    let sources = Sources::new()
        .with(Location::Query, "token", "abc")
        .with(Location::Query, "page", "2");

    let mut authed = Authed::default();
    let err = collecting().decode(&mut authed, sources).unwrap_err();

    assert_eq!(authed.page, 2);
    assert_eq!(authed.token, "");

    let errors = err.field_errors().unwrap();
    assert_eq!(errors.len(), 1);
    let Some(FieldError::Location {
        location, allowed, ..
    }) = errors.get("token")
    else {
        panic!("location error expected");
    };
    assert_eq!(*location, Location::Query);
    assert_eq!(allowed, &vec![Location::Header]);
    assert_eq!(
        err.to_string(),
        "\"token\" param sent in query instead of [header]"
    );
}

#[test]
fn test_header_keys_match_case_insensitively() {
    let sources = Sources::new()
        .with(Location::Header, "Token", "abc")
        .with(Location::Query, "PAGE", "4");

    let mut authed = Authed::default();
    Decoder::new().decode(&mut authed, sources).unwrap();

    assert_eq!(authed.token, "abc");
    assert_eq!(authed.page, 4);
}

#[test]
fn test_unknown_keys_dropped_or_reported() {
    let sources = || Sources::new().with(Location::Query, "nope", "1");

    assert!(Decoder::new()
        .decode(&mut Authed::default(), sources())
        .is_ok());

    let err = strict().decode(&mut Authed::default(), sources()).unwrap_err();
    assert!(matches!(
        err.field_errors().unwrap().get("nope"),
        Some(FieldError::UnknownKey { key }) if key == "nope"
    ));
    assert_eq!(err.to_string(), "invalid param \"nope\"");
}

#[test]
fn test_fail_fast_stops_at_first_error() {
    let sources = || {
        Sources::new()
            .with(Location::Query, "page", "x")
            .with(Location::Query, "token", "abc")
    };

    let err = Decoder::new()
        .decode(&mut Authed::default(), sources())
        .unwrap_err();
    assert_eq!(err.field_errors().unwrap().len(), 1);

    let err = collecting()
        .decode(&mut Authed::default(), sources())
        .unwrap_err();
    let errors = err.field_errors().unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors.to_string().ends_with("(and 1 other error)"));
}

// ---------------------------------------------------------------------------
// JSON body
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Inner {
    c: i32,
}

impl Record for Inner {
    fn declare(fields: &mut Fields<Self>) {
        fields.scalar("c", |r| &mut r.c);
    }
}

#[derive(Debug, Default)]
struct Payload {
    a: i32,
    b: Inner,
}

impl Record for Payload {
    fn declare(fields: &mut Fields<Self>) {
        fields.scalar("a", |r| &mut r.a);
        fields.record("b", |r| &mut r.b);
    }
}

#[test]
fn test_json_body_flattens_into_fields() {
    let sources = Sources::new().with_body(r#"{"a": 1, "b": {"c": 2}}"#);
    let mut payload = Payload::default();
    Decoder::new().decode(&mut payload, sources).unwrap();
    assert_eq!(payload.a, 1);
    assert_eq!(payload.b.c, 2);
}

#[test]
fn test_unknown_top_level_json_key() {
    let decoder = decoder(DecoderConfig {
        ignore_unknown_keys: false,
        collect_errors: true,
        ..DecoderConfig::default()
    });
    let sources = Sources::new().with_body(r#"{"a": 1, "b": {"c": 2}, "z": 1}"#);

    let mut payload = Payload::default();
    let err = decoder.decode(&mut payload, sources).unwrap_err();

    assert_eq!(payload.a, 1);
    assert_eq!(payload.b.c, 2);
    let errors = err.field_errors().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors.get("z"),
        Some(FieldError::UnknownKey { key }) if key == "z"
    ));
}

#[test]
fn test_record_field_given_a_value() {
    let sources = Sources::new().with_body(r#"{"b": "flat"}"#);
    let err = Decoder::new()
        .decode(&mut Payload::default(), sources)
        .unwrap_err();
    assert!(matches!(
        err.field_errors().unwrap().get("b"),
        Some(FieldError::NoConverter { .. })
    ));
}

#[test]
fn test_body_parse_errors() {
    let err = Decoder::new()
        .decode(&mut Payload::default(), Sources::new().with_body("{"))
        .unwrap_err();
    assert!(matches!(
        err,
        DecodeError::Parsing {
            stage: ParseStage::Json,
            ..
        }
    ));

    let err = Decoder::new()
        .decode(&mut Payload::default(), Sources::new().with_body("[1, 2]"))
        .unwrap_err();
    assert!(matches!(
        err,
        DecodeError::Parsing {
            stage: ParseStage::Json,
            ..
        }
    ));
    assert!(err.to_string().contains("must be an object"));

    // A blank body decodes nothing.
    assert!(Decoder::new()
        .decode(&mut Payload::default(), Sources::new().with_body("  "))
        .is_ok());
}

#[test]
fn test_body_read_failure() {
    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
        }
    }

    let err = Decoder::new()
        .decode(&mut Payload::default(), Sources::new().with_body_reader(Broken))
        .unwrap_err();
    assert!(matches!(
        err,
        DecodeError::Parsing {
            stage: ParseStage::Body,
            ..
        }
    ));
}

// ---------------------------------------------------------------------------
// Sequences of records
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq)]
struct Item {
    n: String,
    m: String,
}

impl Record for Item {
    fn declare(fields: &mut Fields<Self>) {
        fields.scalar("n", |r| &mut r.n);
        fields.scalar("m", |r| &mut r.m);
    }
}

#[derive(Debug, Default)]
struct Bag {
    items: Vec<Item>,
}

impl Record for Bag {
    fn declare(fields: &mut Fields<Self>) {
        fields
            .records("items", |r| &mut r.items)
            .name("x")
            .locations(&[Location::Query]);
    }
}

#[test]
fn test_sparse_indices_produce_dense_sequence() {
    let sources = Sources::new()
        .with(Location::Query, "x.5.n", "five")
        .with(Location::Query, "x.2.n", "two")
        .with(Location::Query, "x.5.m", "five-m");

    let mut bag = Bag::default();
    Decoder::new().decode(&mut bag, sources).unwrap();

    // Elements follow the natural order of the keys, not the order given.
    assert_eq!(
        bag.items,
        vec![
            Item {
                n: "two".into(),
                m: String::new(),
            },
            Item {
                n: "five".into(),
                m: "five-m".into(),
            },
        ]
    );
}

#[test]
fn test_json_array_of_records_with_bracket_syntax() {
    #[derive(Debug, Default)]
    struct Gallery {
        images: Vec<Item>,
    }

    impl Record for Gallery {
        fn declare(fields: &mut Fields<Self>) {
            fields.records("images", |r| &mut r.images).name("imgs");
        }
    }

    let decoder = decoder(DecoderConfig {
        syntax: PathSyntax::bracketed('[', ']', None),
        ..DecoderConfig::default()
    });
    let sources =
        Sources::new().with_body(r#"{"imgs": [{"n": "a"}, null, {"n": "b", "m": "c"}]}"#);

    let mut gallery = Gallery::default();
    decoder.decode(&mut gallery, sources).unwrap();

    let names: Vec<&str> = gallery.images.iter().map(|item| item.n.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(gallery.images[1].m, "c");
}

proptest! {
    #[test]
    fn prop_out_of_order_indices_stay_dense(
        indices in proptest::collection::btree_set(0usize..10_000, 1..12)
    ) {
        let mut sources = Sources::new();
        // Insert in descending order; decoding visits keys in natural order.
        for index in indices.iter().rev() {
            sources.insert(Location::Query, format!("x.{index}.n"), index.to_string());
        }

        let mut bag = Bag::default();
        Decoder::new().decode(&mut bag, sources).unwrap();

        let expected: Vec<String> = indices.iter().map(ToString::to_string).collect();
        let got: Vec<String> = bag.items.into_iter().map(|item| item.n).collect();
        prop_assert_eq!(got, expected);
    }
}

#[test]
fn test_natural_order_of_indices() {
    let indices: BTreeSet<usize> = [1, 2, 10].into_iter().collect();
    let mut sources = Sources::new();
    for index in &indices {
        sources.insert(Location::Query, format!("x.{index}.n"), index.to_string());
    }
    let mut bag = Bag::default();
    Decoder::new().decode(&mut bag, sources).unwrap();
    let got: Vec<&str> = bag.items.iter().map(|item| item.n.as_str()).collect();
    assert_eq!(got, vec!["1", "2", "10"]);
}

// ---------------------------------------------------------------------------
// Embedded, boxed and reserved fields
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Paging {
    page: u32,
    per_page: u32,
}

impl Record for Paging {
    fn declare(fields: &mut Fields<Self>) {
        fields.scalar("page", |r| &mut r.page);
        fields.scalar("per_page", |r| &mut r.per_page);
    }
}

#[derive(Debug, Default)]
struct Meta {
    tag: String,
}

impl Record for Meta {
    fn declare(fields: &mut Fields<Self>) {
        fields.scalar("tag", |r| &mut r.tag);
    }
}

#[derive(Debug, Default)]
struct Listing {
    paging: Paging,
    meta: Option<Box<Meta>>,
    title: String,
}

impl Record for Listing {
    fn declare(fields: &mut Fields<Self>) {
        fields
            .embed("paging", |r| &mut r.paging)
            .locations(&[Location::Query]);
        fields.boxed("meta", |r| &mut r.meta);
        fields.scalar("title", |r| &mut r.title);
        fields
            .reserved::<String>("internal")
            .locations(&[Location::Query]);
    }
}

#[test]
fn test_embedded_boxed_and_reserved_fields() {
    let sources = Sources::new()
        .with(Location::Query, "page", "3")
        .with(Location::Query, "per_page", "50")
        .with(Location::Query, "internal", "ignored")
        .with_body(r#"{"meta": {"tag": "news"}, "title": "Hi"}"#);

    let mut listing = Listing::default();
    strict().decode(&mut listing, sources).unwrap();

    assert_eq!(listing.paging.page, 3);
    assert_eq!(listing.paging.per_page, 50);
    assert_eq!(listing.meta.as_ref().map(|meta| meta.tag.as_str()), Some("news"));
    assert_eq!(listing.title, "Hi");
}

#[test]
fn test_boxed_record_stays_none_without_keys() {
    let mut listing = Listing::default();
    Decoder::new()
        .decode(&mut listing, Sources::new().with(Location::Query, "page", "1"))
        .unwrap();
    assert!(listing.meta.is_none());
}

#[test]
fn test_embedded_fields_inherit_locations() {
    let sources = Sources::new().with_body(r#"{"page": 3}"#);
    let err = strict()
        .decode(&mut Listing::default(), sources)
        .unwrap_err();
    // `page` is not a body alias, so the top-level check rejects it.
    assert!(matches!(
        err.field_errors().unwrap().get("page"),
        Some(FieldError::UnknownKey { .. })
    ));

    let sources = Sources::new()
        .with(Location::Query, "page", "3")
        .with(Location::Query, "title", "Hi");
    let mut listing = Listing::default();
    let err = collecting().decode(&mut listing, sources).unwrap_err();
    assert_eq!(listing.paging.page, 3);
    assert!(matches!(
        err.field_errors().unwrap().get("title"),
        Some(FieldError::Location {
            location: Location::Query,
            ..
        })
    ));
}

#[derive(Debug, Default)]
struct Inbound {
    items: Vec<Item>,
}

impl Record for Inbound {
    fn declare(fields: &mut Fields<Self>) {
        fields.records("items", |r| &mut r.items).name("ai");
    }
}

#[derive(Debug, Default)]
struct Outbound {
    items: Vec<Item>,
}

impl Record for Outbound {
    fn declare(fields: &mut Fields<Self>) {
        fields.records("items", |r| &mut r.items).name("bi");
    }
}

#[derive(Debug, Default)]
struct Transfer {
    inbound: Inbound,
    outbound: Outbound,
}

impl Record for Transfer {
    fn declare(fields: &mut Fields<Self>) {
        fields
            .embed("inbound", |r| &mut r.inbound)
            .locations(&[Location::Query]);
        fields
            .embed("outbound", |r| &mut r.outbound)
            .locations(&[Location::Query]);
    }
}

#[test]
fn test_embedded_sequences_with_same_field_name_index_separately() {
    let sources = Sources::new()
        .with(Location::Query, "ai.0.n", "a0")
        .with(Location::Query, "ai.1.n", "a1")
        .with(Location::Query, "bi.1.n", "b1");

    let mut transfer = Transfer::default();
    strict().decode(&mut transfer, sources).unwrap();

    fn names(items: &[Item]) -> Vec<&str> {
        items.iter().map(|item| item.n.as_str()).collect()
    }
    assert_eq!(names(&transfer.inbound.items), vec!["a0", "a1"]);
    assert_eq!(names(&transfer.outbound.items), vec!["b1"]);
}

// ---------------------------------------------------------------------------
// Coercion policies
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Prefs {
    n: i32,
    note: Option<String>,
    flags: Vec<bool>,
}

impl Record for Prefs {
    fn declare(fields: &mut Fields<Self>) {
        fields.scalar("n", |r| &mut r.n).locations(&[Location::Query]);
        fields
            .optional("note", |r| &mut r.note)
            .locations(&[Location::Query]);
        fields
            .list("flags", |r| &mut r.flags)
            .locations(&[Location::Query]);
    }
}

fn filled() -> Prefs {
    Prefs {
        n: 5,
        note: Some("kept".into()),
        flags: Vec::new(),
    }
}

fn empties() -> Sources {
    Sources::new()
        .with(Location::Query, "n", "")
        .with(Location::Query, "note", "")
        .with(Location::Query, "flags", "t")
        .with(Location::Query, "flags", "")
        .with(Location::Query, "flags", "0")
}

#[test]
fn test_empty_values_are_skipped_by_default() {
    let mut prefs = filled();
    Decoder::new().decode(&mut prefs, empties()).unwrap();
    assert_eq!(prefs.n, 5);
    assert_eq!(prefs.note.as_deref(), Some("kept"));
    assert_eq!(prefs.flags, vec![true, false]);
}

#[test]
fn test_zero_empty_resets_fields() {
    let decoder = decoder(DecoderConfig {
        zero_empty: true,
        ..DecoderConfig::default()
    });
    let mut prefs = filled();
    decoder.decode(&mut prefs, empties()).unwrap();
    assert_eq!(prefs.n, 0);
    assert_eq!(prefs.note, None);
    assert_eq!(prefs.flags, vec![true, false, false]);
}

#[test]
fn test_untouched_fields_keep_values() {
    let mut prefs = filled();
    Decoder::new()
        .decode(&mut prefs, Sources::new().with(Location::Query, "n", "9"))
        .unwrap();
    assert_eq!(prefs.n, 9);
    assert_eq!(prefs.note.as_deref(), Some("kept"));
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Color {
    #[default]
    Red,
    Green,
}

impl std::str::FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "red" => Ok(Self::Red),
            "green" => Ok(Self::Green),
            other => Err(format!("unknown color {other:?}")),
        }
    }
}

impl Leaf for Color {
    fn text_decoder() -> Option<TextDecoder<Self>> {
        Some(parse_text::<Self>)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Cents(i64);

impl Leaf for Cents {}

#[derive(Debug, Default)]
struct Paint {
    primary: Color,
    palette: Vec<Color>,
    price: Cents,
}

impl Record for Paint {
    fn declare(fields: &mut Fields<Self>) {
        fields.scalar("primary", |r| &mut r.primary);
        fields.list("palette", |r| &mut r.palette);
        fields.scalar("price", |r| &mut r.price);
    }
}

fn paint_decoder() -> Decoder {
    Decoder::builder()
        .config(DecoderConfig {
            default_location: Some(Location::Query),
            collect_errors: true,
            ..DecoderConfig::default()
        })
        .converter(|raw: &str| -> Result<Cents, BoxError> {
            let (whole, cents) = raw.split_once('.').unwrap_or((raw, "0"));
            Ok(Cents(whole.parse::<i64>()? * 100 + cents.parse::<i64>()?))
        })
        .build()
        .unwrap()
}

#[test]
fn test_text_decoder_and_custom_converter() {
    let sources = Sources::new()
        .with(Location::Query, "primary", "green")
        .with(Location::Query, "palette", "red")
        .with(Location::Query, "palette", "green")
        .with(Location::Query, "price", "12.50");

    let mut paint = Paint::default();
    paint_decoder().decode(&mut paint, sources).unwrap();

    assert_eq!(paint.primary, Color::Green);
    assert_eq!(paint.palette, vec![Color::Red, Color::Green]);
    assert_eq!(paint.price, Cents(1250));
}

#[test]
fn test_text_decoder_errors_carry_index() {
    let sources = Sources::new()
        .with(Location::Query, "palette", "red")
        .with(Location::Query, "palette", "blue")
        .with(Location::Query, "primary", "pink");

    let err = paint_decoder()
        .decode(&mut Paint::default(), sources)
        .unwrap_err();
    let errors = err.field_errors().unwrap();

    let Some(FieldError::Conversion(palette)) = errors.get("palette") else {
        panic!("conversion error expected");
    };
    assert_eq!(palette.index(), Some(1));
    assert!(palette.to_string().contains("unknown color \"blue\""));

    let Some(FieldError::Conversion(primary)) = errors.get("primary") else {
        panic!("conversion error expected");
    };
    assert_eq!(primary.index(), None);
}

#[test]
fn test_unconvertible_fields_are_not_bound() {
    #[derive(Debug, Default)]
    struct Opaque;

    impl Leaf for Opaque {}

    #[derive(Debug, Default)]
    struct Holder {
        label: String,
        opaque: Opaque,
    }

    impl Record for Holder {
        fn declare(fields: &mut Fields<Self>) {
            fields.scalar("label", |r| &mut r.label);
            fields.scalar("opaque", |r| &mut r.opaque);
        }
    }

    let decoder = Decoder::new();
    assert!(decoder.metadata::<Holder>().field("opaque").is_none());
    let err = strict()
        .decode(
            &mut Holder::default(),
            Sources::new().with_body(r#"{"label": "x", "opaque": 1}"#),
        )
        .unwrap_err();
    assert!(matches!(
        err.field_errors().unwrap().get("opaque"),
        Some(FieldError::UnknownKey { .. })
    ));
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct MemoryUpload {
    name: &'static str,
    data: &'static [u8],
    broken: bool,
}

impl Upload for MemoryUpload {
    fn file_name(&self) -> &str {
        self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        if self.broken {
            return Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
        }
        Ok(Box::new(Cursor::new(self.data)))
    }
}

fn upload(name: &'static str, data: &'static [u8]) -> FileHandle {
    FileHandle::new(MemoryUpload {
        name,
        data,
        broken: false,
    })
}

#[derive(Debug, Default)]
struct Submission {
    title: String,
    avatar: Option<FileHandle>,
    docs: Vec<FileStream>,
}

impl Record for Submission {
    fn declare(fields: &mut Fields<Self>) {
        fields.scalar("title", |r| &mut r.title);
        fields.file("avatar", |r| &mut r.avatar);
        fields.file("docs", |r| &mut r.docs);
    }
}

#[test]
fn test_files_and_form_values() {
    let decoder = Decoder::new();
    let meta = decoder.metadata::<Submission>();
    assert!(meta.has_files());
    assert_eq!(meta.field("title").unwrap().locations(), &[Location::Form]);

    let sources = Sources::new()
        .with(Location::Form, "title", "report")
        .with_file("avatar", upload("me.png", b"png"))
        .with_file("docs[]", upload("a.txt", b"alpha"))
        .with_file("docs[]", upload("b.txt", b"beta"));

    let mut submission = Submission::default();
    decoder.decode(&mut submission, sources).unwrap();

    assert_eq!(submission.title, "report");
    let avatar = submission.avatar.as_ref().unwrap();
    assert_eq!(avatar.file_name(), "me.png");
    assert_eq!(avatar.size(), 3);

    let mut contents = Vec::new();
    for stream in &mut submission.docs {
        let mut text = String::new();
        stream.read_to_string(&mut text).unwrap();
        contents.push((stream.file_name().to_string(), text));
    }
    assert_eq!(
        contents,
        vec![
            ("a.txt".to_string(), "alpha".to_string()),
            ("b.txt".to_string(), "beta".to_string()),
        ]
    );
}

#[test]
fn test_file_open_failure() {
    let sources = Sources::new()
        .with_file("docs", upload("a.txt", b"alpha"))
        .with_file(
            "docs",
            FileHandle::new(MemoryUpload {
                name: "b.txt",
                data: b"",
                broken: true,
            }),
        );

    let mut submission = Submission::default();
    let err = Decoder::new().decode(&mut submission, sources).unwrap_err();

    assert!(submission.docs.is_empty());
    let Some(FieldError::FileOpen { source, .. }) = err.field_errors().unwrap().get("docs") else {
        panic!("file open error expected");
    };
    assert_eq!(source.file_name, "b.txt");
}

#[test]
fn test_files_for_unknown_keys() {
    let sources = Sources::new().with_file("resume", upload("cv.pdf", b"%PDF"));
    assert!(Decoder::new()
        .decode(&mut Submission::default(), sources)
        .is_ok());

    let sources = Sources::new().with_file("resume", upload("cv.pdf", b"%PDF"));
    let err = strict()
        .decode(&mut Submission::default(), sources)
        .unwrap_err();
    assert!(err.field_errors().unwrap().get("resume").is_some());
}

#[test]
fn test_form_value_sent_as_file_is_rejected() {
    let sources = Sources::new().with_file("title", upload("t.txt", b"x"));
    let err = Decoder::new()
        .decode(&mut Submission::default(), sources)
        .unwrap_err();
    assert!(matches!(
        err.field_errors().unwrap().get("title"),
        Some(FieldError::Location {
            location: Location::File,
            ..
        })
    ));
}

// ---------------------------------------------------------------------------
// Shared decoder
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Customer {
    name: String,
    vip: bool,
}

impl Record for Customer {
    fn declare(fields: &mut Fields<Self>) {
        fields.scalar("name", |r| &mut r.name);
        fields.scalar("vip", |r| &mut r.vip);
    }
}

#[derive(Debug, Default)]
struct OrderLine {
    sku: String,
    qty: u32,
}

impl Record for OrderLine {
    fn declare(fields: &mut Fields<Self>) {
        fields.scalar("sku", |r| &mut r.sku);
        fields.scalar("qty", |r| &mut r.qty);
    }
}

#[derive(Debug, Default)]
struct Order {
    customer: Customer,
    lines: Vec<OrderLine>,
}

impl Record for Order {
    fn declare(fields: &mut Fields<Self>) {
        fields
            .record("customer", |r| &mut r.customer)
            .locations(&[Location::Query]);
        fields
            .records("lines", |r| &mut r.lines)
            .locations(&[Location::Query]);
    }
}

#[test]
fn test_first_decodes_race_on_a_shared_decoder() {
    const THREADS: u32 = 8;

    let decoder = strict();
    let start = std::sync::Barrier::new(THREADS as usize);

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|id| {
                let decoder = &decoder;
                let start = &start;
                scope.spawn(move || {
                    let sources = Sources::new()
                        .with(Location::Query, "customer.name", format!("c{id}"))
                        .with(Location::Query, "customer.vip", (id % 2 == 0).to_string())
                        .with(Location::Query, "lines.0.sku", format!("s{id}"))
                        .with(Location::Query, "lines.0.qty", id.to_string())
                        .with(Location::Query, "lines.1.sku", "extra");

                    start.wait();
                    let mut order = Order::default();
                    decoder.decode(&mut order, sources).map(|()| (id, order))
                })
            })
            .collect();

        for handle in handles {
            let (id, order) = handle.join().unwrap().unwrap();
            assert_eq!(order.customer.name, format!("c{id}"));
            assert_eq!(order.customer.vip, id % 2 == 0);
            assert_eq!(order.lines.len(), 2);
            assert_eq!(order.lines[0].sku, format!("s{id}"));
            assert_eq!(order.lines[0].qty, id);
            assert_eq!(order.lines[1].sku, "extra");
        }
    });

    let meta = decoder.metadata::<Order>();
    assert!(meta.field("customer").is_some());
    assert!(meta.field("lines").is_some());
}
