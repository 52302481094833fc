//! Cross-transform tests over an in-memory file tree.
//!
//! Each test builds a small multi-file API in [`MemoryFs`], runs one or more
//! transforms, and checks the resulting document.

use indoc::indoc;
use pretty_assertions::assert_eq;
use serde_yaml_ng::Value;

use oaskit::{
    BundleNaming, BundleOptions, CancelToken, ComponentKind, Error, LocalizeOptions, MemoryFs,
    ResolveOptions, SanitizeOptions,
};

const ROOT: &str = "api/openapi.yaml";

const ROOT_DOC: &str = indoc! {r"
    openapi: 3.1.0
    info:
      title: Users
      version: 1.0.0
      x-audience: internal
    tags:
      - name: users
      - name: legacy
    paths:
      /users/{id}:
        get:
          tags: [users]
          x-rate-limit: 10
          responses:
            '200':
              description: OK
              content:
                application/json:
                  schema:
                    $ref: ./components.yaml#/components/schemas/User
            '404':
              $ref: ./responses.yaml#/NotFound
    components:
      schemas:
        Orphan:
          type: object
          properties:
            unused: {type: string}
"};

fn api() -> MemoryFs {
    MemoryFs::new()
        .with_file(
            "api/components.yaml",
            indoc! {r"
                components:
                  schemas:
                    User:
                      type: object
                      required: [id]
                      properties:
                        id: {type: string}
                        address:
                          $ref: ./schemas/address.yaml#/Address
            "},
        )
        .with_file(
            "api/schemas/address.yaml",
            indoc! {r"
                Address:
                  type: object
                  x-go-type: Address
                  properties:
                    city: {type: string}
            "},
        )
        .with_file(
            "api/responses.yaml",
            indoc! {r"
                NotFound:
                  description: Not found
                  content:
                    application/json:
                      schema:
                        $ref: ./schemas/address.yaml#/Address
            "},
        )
}

fn parse(yaml: &str) -> Value {
    serde_yaml_ng::from_str(yaml).expect("fixture should parse")
}

fn run_bundle(doc: &mut Value, fs: &MemoryFs) -> oaskit::BundleReport {
    let options = BundleOptions::new(ResolveOptions::new(ROOT).fs(fs));
    oaskit::bundle(doc, &options).expect("bundle should succeed")
}

fn schema_names(doc: &Value) -> Vec<String> {
    doc["components"]["schemas"]
        .as_mapping()
        .map(|m| m.keys().filter_map(|k| k.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

#[test]
fn bundle_closes_over_every_external_reference() {
    let fs = api();
    let mut doc = parse(ROOT_DOC);
    let report = run_bundle(&mut doc, &fs);

    assert_eq!(report.documents_fetched, 3);
    assert_eq!(schema_names(&doc), vec!["Orphan", "User", "Address"]);
    assert_eq!(
        doc["components"]["responses"]["NotFound"]["description"].as_str(),
        Some("Not found")
    );

    let text = serde_yaml_ng::to_string(&doc).unwrap();
    assert!(!text.contains(".yaml"), "external reference left behind:\n{text}");
    assert_eq!(
        doc["components"]["schemas"]["User"]["properties"]["address"]["$ref"].as_str(),
        Some("#/components/schemas/Address")
    );
}

#[test]
fn bundle_is_deterministic() {
    let fs = api();
    let mut first = parse(ROOT_DOC);
    let mut second = parse(ROOT_DOC);
    run_bundle(&mut first, &fs);
    run_bundle(&mut second, &fs);

    assert_eq!(
        serde_yaml_ng::to_string(&first).unwrap(),
        serde_yaml_ng::to_string(&second).unwrap()
    );
}

#[test]
fn bundle_reuses_identical_external_schemas() {
    let fs = api().with_file(
        "api/copy/address.yaml",
        "Address:\n  properties:\n    city: {type: string}\n  x-go-type: Address\n  type: object\n",
    );
    let mut doc = parse(indoc! {r"
        openapi: 3.1.0
        paths: {}
        components:
          schemas:
            Home: {$ref: ./schemas/address.yaml#/Address}
            Work: {$ref: ./copy/address.yaml#/Address}
    "});
    let report = run_bundle(&mut doc, &fs);

    assert_eq!(report.components_added, 1);
    assert_eq!(report.components_reused, 1);
    assert_eq!(schema_names(&doc), vec!["Home", "Work", "Address"]);
}

#[test]
fn bundle_file_path_naming_on_collision() {
    let fs = api().with_file("api/other/address.yaml", "Address: {type: string}\n");
    let mut doc = parse(indoc! {r"
        openapi: 3.1.0
        paths: {}
        components:
          schemas:
            Home: {$ref: ./schemas/address.yaml#/Address}
            Legacy: {$ref: ./other/address.yaml#/Address}
    "});
    let options = BundleOptions::new(ResolveOptions::new(ROOT).fs(&fs))
        .naming(BundleNaming::FilePath);
    oaskit::bundle(&mut doc, &options).unwrap();

    assert_eq!(
        doc["components"]["schemas"]["Legacy"]["$ref"].as_str(),
        Some("#/components/schemas/other_address_Address")
    );
}

#[test]
fn bundle_then_clean_drops_unreachable() {
    let fs = api();
    let mut doc = parse(ROOT_DOC);
    run_bundle(&mut doc, &fs);

    let report = oaskit::clean(&mut doc).unwrap();
    assert_eq!(
        report.removed_components,
        vec![(ComponentKind::Schemas, "Orphan".to_string())]
    );
    assert_eq!(report.removed_tags, vec!["legacy"]);
    assert_eq!(schema_names(&doc), vec!["User", "Address"]);

    let again = oaskit::clean(&mut doc).unwrap();
    assert!(again.removed_components.is_empty());
    assert!(again.removed_tags.is_empty());
}

#[test]
fn localize_then_bundle_matches_direct_bundle() {
    let fs = api();
    let mut direct = parse(ROOT_DOC);
    run_bundle(&mut direct, &fs);

    let mut localized = parse(ROOT_DOC);
    let options = LocalizeOptions::new(ResolveOptions::new(ROOT).fs(&fs), "api/localized");
    let report = oaskit::localize(&mut localized, &options).unwrap();

    let written: Vec<&str> = report.files.iter().map(|(_, to)| to.as_str()).collect();
    assert_eq!(
        written,
        vec![
            "api/localized/components.yaml",
            "api/localized/address.yaml",
            "api/localized/responses.yaml",
        ]
    );
    assert_eq!(report.references_rewritten, 2);
    assert_eq!(
        localized["paths"]["/users/{id}"]["get"]["responses"]["200"]["content"]
            ["application/json"]["schema"]["$ref"]
            .as_str(),
        Some("localized/components.yaml#/components/schemas/User")
    );

    // Copies point at each other
    let components = parse(&fs.get_string("api/localized/components.yaml").unwrap());
    assert_eq!(
        components["components"]["schemas"]["User"]["properties"]["address"]["$ref"].as_str(),
        Some("address.yaml#/Address")
    );

    run_bundle(&mut localized, &fs);
    assert_eq!(localized, direct);
}

#[test]
fn optimize_after_bundle_is_stable() {
    let fs = api();
    let mut doc = parse(indoc! {r"
        openapi: 3.1.0
        paths:
          /a:
            post:
              requestBody:
                content:
                  application/json:
                    schema:
                      type: object
                      properties:
                        page: {type: object, properties: {size: {type: integer}}}
              responses: {}
          /b:
            post:
              requestBody:
                content:
                  application/json:
                    schema:
                      type: object
                      properties:
                        page: {type: object, properties: {size: {type: integer}}}
                        home: {$ref: ./schemas/address.yaml#/Address}
              responses: {}
    "});
    run_bundle(&mut doc, &fs);

    let report = oaskit::optimize(&mut doc).unwrap();
    assert_eq!(report.created, vec!["Page"]);
    assert_eq!(report.replaced, 2);

    let once = doc.clone();
    let again = oaskit::optimize(&mut doc).unwrap();
    assert!(again.created.is_empty());
    assert_eq!(again.replaced, 0);
    assert_eq!(doc, once);
}

#[test]
fn sanitize_after_bundle_strips_and_cleans() {
    let fs = api();
    let mut doc = parse(ROOT_DOC);
    run_bundle(&mut doc, &fs);

    let options = SanitizeOptions::new().keep_extensions(["x-rate-*", "x-unused-*"]);
    let report = oaskit::sanitize(&mut doc, &options).unwrap();

    assert_eq!(report.extensions_removed, 2);
    assert_eq!(report.warnings, vec!["pattern `x-unused-*` matched no extension"]);
    assert!(doc["info"].get("x-audience").is_none());
    assert!(doc["components"]["schemas"]["Address"].get("x-go-type").is_none());
    assert_eq!(
        doc["paths"]["/users/{id}"]["get"]["x-rate-limit"].as_u64(),
        Some(10)
    );
    let clean = report.clean.expect("clean should run");
    assert_eq!(
        clean.removed_components,
        vec![(ComponentKind::Schemas, "Orphan".to_string())]
    );
}

#[test]
fn cancelled_bundle_stops_before_io() {
    let fs = api();
    let token = CancelToken::new();
    token.cancel();

    let mut doc = parse(ROOT_DOC);
    let options = BundleOptions::new(ResolveOptions::new(ROOT).fs(&fs).cancel(&token));
    let err = oaskit::bundle(&mut doc, &options).unwrap_err();
    assert!(matches!(err, Error::Walk(_)));
    assert_eq!(doc, parse(ROOT_DOC));
}

#[test]
fn localize_requires_target_directory() {
    let fs = api();
    let mut doc = parse(ROOT_DOC);
    let options = LocalizeOptions::new(ResolveOptions::new(ROOT).fs(&fs), "");
    let err = oaskit::localize(&mut doc, &options).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(fs.paths().len(), 4);
}

#[test]
fn localize_twice_names_files_the_same() {
    let fs = api();
    let options = LocalizeOptions::new(ResolveOptions::new(ROOT).fs(&fs), "api/localized");

    let mut first = parse(ROOT_DOC);
    let first_report = oaskit::localize(&mut first, &options).unwrap();
    let first_copy = fs.get_string("api/localized/components.yaml");

    let mut second = parse(ROOT_DOC);
    let second_report = oaskit::localize(&mut second, &options).unwrap();

    assert_eq!(first_report, second_report);
    assert_eq!(first, second);
    assert_eq!(fs.get_string("api/localized/components.yaml"), first_copy);
}
