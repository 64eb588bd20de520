//! Product advisor tools backed by a JSON product file.
//!
//! The file holds a list of categories, each with its variations and the
//! concrete product models of every variation:
//!
//! ```json
//! [
//!   {
//!     "category": "Oven",
//!     "title": "Ovens",
//!     "text": "Bake, roast and steam.",
//!     "image": "https://example.com/oven.png",
//!     "description": "Built-in ovens for every kitchen.",
//!     "question": "Do you cook with steam?",
//!     "variations": [
//!       {
//!         "name": "Microwave",
//!         "text": "Quick and convenient.",
//!         "image": "https://example.com/microwave.png",
//!         "description": "Reheats and defrosts in minutes.",
//!         "products": [
//!           { "title": "M 7240 TC", "text": "Touch display.", "image": "https://example.com/m7240.png" }
//!         ]
//!       }
//!     ]
//!   }
//! ]
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::tools::{ToolContext, ToolError, ToolRegistry, ToolResult};

use super::{CatalogError, pick, string_argument};

pub const SYSTEM_MESSAGE: &str = concat!(
    "You are a helpful assistant that maintains a conversation with the user while helping them choose a product.\n",
    "The user needs to decide on a product category, a variation and finally a specific model.\n",
    "You MUST start the conversation by introducing yourself and explain to the user that you will be asking questions to help narrow down their choices.\n",
    "Your first step should be to use the get_available_categories tool to find out the product categories and related questions that help the user understand the differences between them.\n",
    "Use the show_product_categories tool to show the user the available categories.\n",
    "When the user asks about the variations of a category use the get_product_variants_by_category tool and show them with the show_product_information tool.\n",
    "Once the user is clear on the variation, help them narrow down to a specific model by retrieving models with the get_product_models_by_variant tool and showing them with the show_product_models tool.\n",
    "You must engage the user in a friendly conversation, follow their interest and use the show_product_information and show_product_models tools whenever the conversation moves to a different product.\n",
);

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProductModel {
    pub title: String,
    pub text: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProductVariation {
    pub name: String,
    pub text: String,
    pub image: String,
    pub description: String,
    pub products: Vec<ProductModel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProductCategory {
    pub category: String,
    pub title: String,
    pub text: String,
    pub image: String,
    pub description: String,
    pub question: Option<String>,
    pub variations: Vec<ProductVariation>,
}

/// Read-only product data shared by the product tools.
#[derive(Debug, Clone, Default)]
pub struct ProductStore {
    categories: Vec<ProductCategory>,
}

impl ProductStore {
    pub fn new(categories: Vec<ProductCategory>) -> Self {
        Self { categories }
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let categories =
            serde_json::from_str(&contents).map_err(|source| CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(categories))
    }

    pub fn categories(&self) -> &[ProductCategory] {
        &self.categories
    }

    fn category(&self, name: &str) -> Option<&ProductCategory> {
        let name = name.trim();
        self.categories
            .iter()
            .find(|item| item.category.eq_ignore_ascii_case(name))
    }

    fn variation(&self, name: &str) -> Option<(&ProductCategory, &ProductVariation)> {
        let name = name.trim();
        self.categories.iter().find_map(|category| {
            category
                .variations
                .iter()
                .find(|variation| variation.name.eq_ignore_ascii_case(name))
                .map(|variation| (category, variation))
        })
    }

    fn category_names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.category.as_str()).collect()
    }

    fn all_models(&self) -> impl Iterator<Item = &ProductModel> {
        self.categories
            .iter()
            .flat_map(|category| category.variations.iter())
            .flat_map(|variation| variation.products.iter())
    }

    // ------------------------------------------------------------------------
    // Tool handlers
    // ------------------------------------------------------------------------

    fn available_categories(&self) -> ToolResult {
        let categories: Vec<Value> = self
            .categories
            .iter()
            .map(|item| {
                json!({
                    "category_name": item.category,
                    "category_description": item.description,
                    "image": item.image,
                    "text": item.text,
                    "question": item.question,
                })
            })
            .collect();
        ToolResult::to_upstream(categories)
    }

    fn variants_by_category(&self, arguments: &Value) -> Result<ToolResult, ToolError> {
        let requested = string_argument(arguments, "category")?;
        let Some(category) = self.category(requested) else {
            return Ok(ToolResult::error(format!(
                "Unknown category '{requested}'. Available categories: {}",
                self.category_names().join(", ")
            )));
        };

        let variants: Vec<Value> = category
            .variations
            .iter()
            .map(|variation| {
                json!({
                    "name": variation.name,
                    "description": variation.description,
                    "image": variation.image,
                    "text": variation.text,
                    "category": category.category,
                })
            })
            .collect();
        Ok(ToolResult::to_upstream(variants))
    }

    fn models_by_variant(&self, arguments: &Value) -> Result<ToolResult, ToolError> {
        let requested = string_argument(arguments, "variant")?;
        let Some((category, variation)) = self.variation(requested) else {
            return Ok(ToolResult::error(format!(
                "Unknown product variant '{requested}'"
            )));
        };

        let models: Vec<Value> = variation
            .products
            .iter()
            .map(|product| {
                json!({
                    "title": product.title,
                    "text": product.text,
                    "image": product.image,
                    "description": product.description,
                    "category": category.category,
                })
            })
            .collect();
        Ok(ToolResult::to_upstream(models))
    }

    fn category_cards(&self) -> ToolResult {
        let cards: Vec<Value> = self
            .categories
            .iter()
            .map(|item| json!({ "title": item.title, "text": item.text, "image": item.image }))
            .collect();
        ToolResult::to_downstream(cards)
    }

    fn model_cards(&self) -> ToolResult {
        let cards: Vec<Value> = self
            .all_models()
            .map(|model| json!({ "title": model.title, "text": model.text, "image": model.image }))
            .collect();
        ToolResult::to_downstream(cards)
    }
}

// ============================================================================
// Schemas
// ============================================================================

fn card_list_schema(name: &str, field: &str, description: &str) -> Value {
    json!({
        "type": "function",
        "name": name,
        "description": description,
        "parameters": {
            "type": "object",
            "properties": {
                field: {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "category_name": {
                                "type": "string",
                                "description": "The name of the category."
                            },
                            "category_description": {
                                "type": "string",
                                "description": "The description of the category."
                            },
                            "image": {
                                "type": "string",
                                "description": "The url of the image that should be displayed to the user."
                            }
                        },
                        "required": ["category_name", "category_description", "image"],
                        "additionalProperties": false
                    }
                }
            },
            "required": [field],
            "additionalProperties": false
        }
    })
}

fn single_string_schema(name: &str, field: &str, field_description: &str, description: &str) -> Value {
    json!({
        "type": "function",
        "name": name,
        "description": description,
        "parameters": {
            "type": "object",
            "properties": {
                field: {
                    "type": "string",
                    "description": field_description
                }
            },
            "required": [field],
            "additionalProperties": false
        }
    })
}

fn get_available_categories_schema() -> Value {
    json!({
        "type": "function",
        "name": "get_available_categories",
        "description": "Search the product database for the available product categories. The knowledge base is in English, translate to and from English if needed. Results are returned in JSON format with a set of metadata that might help the user understand the available options with title, description and image.",
        "parameters": {
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": "Context provided by the user."
                }
            },
            "required": [],
            "additionalProperties": false
        }
    })
}

fn show_product_information_schema() -> Value {
    json!({
        "type": "function",
        "name": "show_product_information",
        "description": "Shows the user a piece of information to support the conversation. The information should be a title, supporting text and reference to an image that can be displayed to the user.",
        "parameters": {
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "The title of the information."
                },
                "text": {
                    "type": "string",
                    "description": "Additional context that should be displayed to the user."
                },
                "image": {
                    "type": "string",
                    "description": "The url of the image that should be displayed to the user."
                }
            },
            "required": ["title", "text", "image"],
            "additionalProperties": false
        }
    })
}

pub(super) fn register(registry: &mut ToolRegistry, store: ProductStore) -> Result<(), ToolError> {
    let store = Arc::new(store);

    let categories = Arc::clone(&store);
    registry.register(
        "get_available_categories",
        get_available_categories_schema(),
        move |_args: Value, _ctx: ToolContext| {
            let store = Arc::clone(&categories);
            async move { Ok(store.available_categories()) }
        },
    )?;

    let variants = Arc::clone(&store);
    registry.register(
        "get_product_variants_by_category",
        single_string_schema(
            "get_product_variants_by_category",
            "category",
            "The name of the product category.",
            "Search the product database for the product variants of a category. The knowledge base is in English, translate to and from English if needed. Results are returned in JSON format with a set of product names, descriptions and images.",
        ),
        move |args: Value, _ctx: ToolContext| {
            let store = Arc::clone(&variants);
            async move { store.variants_by_category(&args) }
        },
    )?;

    let models = Arc::clone(&store);
    registry.register(
        "get_product_models_by_variant",
        single_string_schema(
            "get_product_models_by_variant",
            "variant",
            "The name of the product variant.",
            "Search the product database for the products of a specific variant. The knowledge base is in English, translate to and from English if needed. Results are returned in JSON format with a set of product names, descriptions and images.",
        ),
        move |args: Value, _ctx: ToolContext| {
            let store = Arc::clone(&models);
            async move { store.models_by_variant(&args) }
        },
    )?;

    registry.register(
        "show_product_information",
        show_product_information_schema(),
        |args: Value, _ctx: ToolContext| async move {
            Ok(ToolResult::to_downstream(pick(&args, &["title", "text", "image"])))
        },
    )?;

    let cards = Arc::clone(&store);
    registry.register(
        "show_product_categories",
        card_list_schema(
            "show_product_categories",
            "product_categories",
            "Shows the user the available product categories, each with a title, supporting text and an image.",
        ),
        move |_args: Value, _ctx: ToolContext| {
            let store = Arc::clone(&cards);
            async move { Ok(store.category_cards()) }
        },
    )?;

    registry.register(
        "show_product_models",
        card_list_schema(
            "show_product_models",
            "product_models",
            "Shows the user the available product models, each with a title, supporting text and an image.",
        ),
        move |_args: Value, _ctx: ToolContext| {
            let store = Arc::clone(&store);
            async move { Ok(store.model_cards()) }
        },
    )?;

    Ok(())
}
