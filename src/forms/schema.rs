use super::{FieldRule, FieldSpec, SelectOption};
use crate::models::{CategorySlug, TableKind};
use serde_json::json;

/// Field descriptors for each admin table, in display order.
pub fn schema_for(table: TableKind) -> Vec<FieldSpec> {
    match table {
        TableKind::Settings => vec![
            FieldSpec::text("site_title", "Site title", 120).required(),
            FieldSpec::image("hero_image", "Hero image"),
            FieldSpec::text("contact_email", "Contact email", 254).with_rule(FieldRule::Email),
            FieldSpec::text("contact_phone", "Contact phone", 40),
            FieldSpec::text("instagram_url", "Instagram", 300).with_rule(FieldRule::Url),
        ],
        TableKind::About => vec![
            FieldSpec::text("heading", "Heading", 200).required(),
            FieldSpec::rich_text("body", "Body", 20_000).required(),
            FieldSpec::image("image", "Portrait"),
        ],
        TableKind::PortfolioCategories => vec![
            FieldSpec::select("id", "Category", category_options())
                .required()
                .with_rule(FieldRule::Slug)
                .create_only(),
            FieldSpec::text("title", "Title", 80).required(),
            FieldSpec::rich_text("description", "Description", 2_000),
            FieldSpec::image("cover_image", "Cover image"),
            sort_order(),
        ],
        TableKind::Clients => vec![
            FieldSpec::select_from("category_id", "Category", TableKind::PortfolioCategories)
                .required(),
            FieldSpec::text("name", "Client name", 120).required(),
            FieldSpec::rich_text("description", "Description", 5_000),
            FieldSpec::image("cover_image", "Cover image"),
            sort_order(),
        ],
        TableKind::ClientImages => vec![
            FieldSpec::select_from("client_id", "Client", TableKind::Clients).required(),
            FieldSpec::image("image", "Image").required(),
            FieldSpec::text("caption", "Caption", 300),
            sort_order(),
        ],
        TableKind::NavbarLinks => vec![
            FieldSpec::text("label", "Label", 60).required(),
            FieldSpec::text("href", "Link", 300)
                .required()
                .with_rule(FieldRule::Href),
            sort_order(),
        ],
    }
}

fn sort_order() -> FieldSpec {
    FieldSpec::number("sort_order", "Order", Some(0), Some(10_000)).with_default(json!(0))
}

fn category_options() -> Vec<SelectOption> {
    CategorySlug::ALL
        .into_iter()
        .map(|c| SelectOption {
            value: c.as_str().to_string(),
            label: c.title().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::{FieldKind, ValidationMode, validate_payload};
    use serde_json::json;

    #[test]
    fn test_every_table_has_a_schema() {
        for table in TableKind::ALL {
            assert!(!schema_for(table).is_empty(), "{} has no fields", table);
        }
    }

    #[test]
    fn test_image_columns_render_as_image_inputs() {
        for table in TableKind::ALL {
            let fields = schema_for(table);
            for column in table.image_columns() {
                let field = fields
                    .iter()
                    .find(|f| f.name == *column)
                    .unwrap_or_else(|| panic!("{}.{} missing", table, column));
                assert_eq!(field.kind, FieldKind::Image);
            }
        }
    }

    #[test]
    fn test_category_id_must_be_a_known_slug() {
        let payload = json!({"id": "weddings", "title": "Weddings"});
        assert!(
            validate_payload(
                TableKind::PortfolioCategories,
                payload.as_object().unwrap(),
                ValidationMode::Create
            )
            .is_err()
        );

        let payload = json!({"id": "events", "title": "Events"});
        assert!(
            validate_payload(
                TableKind::PortfolioCategories,
                payload.as_object().unwrap(),
                ValidationMode::Create
            )
            .is_ok()
        );
    }
}
