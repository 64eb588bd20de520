//! Car rental assistant tools.

use serde_json::{Value, json};

use crate::core::tools::{ToolContext, ToolError, ToolRegistry, ToolResult};

use super::pick;

pub const SYSTEM_MESSAGE: &str = concat!(
    "You are a helpful assistant working in a car rental company and are tasked to help the user make a rental car choice.\n",
    "The user is interested in renting a car and needs to decide the pickup location, preferred car type, pickup and return date.\n",
    "You MUST start the conversation by introducing yourself and explain to the user that you will be asking questions to help narrow down their choices.\n",
    "You should ask the user for the preferred pickup location and use the get_available_locations tool to propose the two closest locations.\n",
    "After the user has selected a pickup location you should ask for the pickup and return date and then retrieve the available cars with the get_available_cars tool.\n",
    "After the user has selected a car you should use the show_model_information tool to show the user the car information. Help the user make the right choice by asking for the required number of seats and the transmission type they need.\n",
    "You must engage the user in a friendly conversation, follow their interest and guide them along while making sure you use show_model_information whenever the user changes their preference to a different car model.\n",
    "Once the user has selected the car model you should use the show_final_details tool to show the user the final details of the rental.\n",
);

// ============================================================================
// Schemas
// ============================================================================

fn get_available_locations_schema() -> Value {
    json!({
        "type": "function",
        "name": "get_available_locations",
        "description": "Search the location database for possible car pickup locations. The knowledge base is in English, translate to and from English if needed. Results are returned in JSON format with a set of metadata that might help the user understand the available options with location, distance and opening hours",
        "parameters": {
            "type": "object",
            "properties": {
                "prefered_location": {
                    "type": "string",
                    "description": "The user prefered pickup location."
                }
            },
            "required": ["prefered_location"],
            "additionalProperties": false
        }
    })
}

fn get_available_cars_schema() -> Value {
    json!({
        "type": "function",
        "name": "get_available_cars",
        "description": "Search the model database for possible car models. The knowledge base is in German, translate to and from German if needed. Results are returned in JSON format with a set of metadata that might help the user understand the available options with name, image, price and available seats.",
        "parameters": {
            "type": "object",
            "properties": {
                "prefered_location": {
                    "type": "string",
                    "description": "The user prefered pickup location."
                }
            },
            "required": ["prefered_location"],
            "additionalProperties": false
        }
    })
}

fn show_model_information_schema() -> Value {
    json!({
        "type": "function",
        "name": "show_model_information",
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

fn show_final_details_schema() -> Value {
    json!({
        "type": "function",
        "name": "show_final_details",
        "description": "Shows the user the final details of the car rental including pickup location, car model, pickup and return date.",
        "parameters": {
            "type": "object",
            "properties": {
                "pickup_location": {
                    "type": "string",
                    "description": "The pickup location selected by the user."
                },
                "car_model": {
                    "type": "string",
                    "description": "The car model selected by the user."
                },
                "pickup_date": {
                    "type": "string",
                    "description": "The pickup date selected by the user."
                },
                "return_date": {
                    "type": "string",
                    "description": "The return date selected by the user."
                }
            },
            "required": ["pickup_location", "car_model", "pickup_date", "return_date"],
            "additionalProperties": false
        }
    })
}

// ============================================================================
// Data
// ============================================================================

fn locations() -> Value {
    json!([
        {
            "id": "1",
            "name": "Düsseldorf Airport",
            "title": "Düsseldorf Airport",
            "address": "Flughafenstraße 120, 40474 Düsseldorf, Germany",
            "distance": "30 km",
            "opening_hours": "Mo - So 06:00 - 23:30"
        },
        {
            "id": "2",
            "name": "Cologne Central Station",
            "address": "Trankgasse 11, 50667 Köln, Germany",
            "distance": "25 km",
            "opening_hours": "Mo - So 05:00 - 22:00"
        },
        {
            "id": "3",
            "name": "Frankfurt Main Airport",
            "address": "60547 Frankfurt am Main, Germany",
            "distance": "120 km",
            "opening_hours": "Mo - So 24/7"
        },
        {
            "id": "4",
            "name": "Berlin Tegel Airport",
            "address": "Friedrichstraße 50, 10117 Berlin, Germany",
            "distance": "650 km",
            "opening_hours": "Mo - So 24/7"
        },
        {
            "id": "5",
            "name": "Munich Central Station",
            "address": "Bahnhofplatz 1, 80335 München, Germany",
            "distance": "500 km",
            "opening_hours": "Mo - So 04:00 - 01:00"
        }
    ])
}

fn cars() -> Value {
    json!([
        {
            "id": "1",
            "name": "SUV",
            "title": "SUV",
            "image": "/static/cars/cat_1_var_1.png",
            "text": "Ein vollelektrischer SUV, der die Zukunft der Mobilität verkörpert.",
            "description": "Der vollelektrische SUV bietet eine beeindruckende Reichweite von 500 km und ist mit modernster Technologie ausgestattet. Er verfügt über ein geräumiges Interieur, fortschrittliche Sicherheitsfunktionen und ein elegantes Design.",
            "price": "90.00 € per day",
            "seats": 6,
            "transmission": "Automatic"
        },
        {
            "id": "2",
            "name": "Sedan",
            "title": "Practical Sedan",
            "image": "/static/cars/cat_1_var_2_mod_2.png",
            "text": "Ein luxuriöser Sedan mit fortschrittlicher Technologie.",
            "description": "Der luxuriöse Sedan bietet eine Kombination aus Komfort und Leistung. Er ist mit einem leistungsstarken Motor ausgestattet, der eine sanfte Fahrt ermöglicht. Das Interieur ist mit hochwertigen Materialien gestaltet und bietet modernste Infotainment-Systeme.",
            "price": "60.00 € per day",
            "seats": 5,
            "transmission": "Automatic"
        },
        {
            "id": "3",
            "name": "Compact",
            "title": "Compact City Car",
            "image": "/static/cars/cat_1_var_3.png",
            "text": "Ein kompakter und effizienter Stadtwagen.",
            "description": "Der kompakte Stadtwagen ist ideal für den urbanen Verkehr. Er bietet eine hohe Kraftstoffeffizienz und ist leicht zu parken. Das Interieur ist funktional.",
            "price": "55.00 € per day",
            "seats": 4,
            "transmission": "Manual"
        },
        {
            "id": "4",
            "name": "Limousine",
            "title": "Elegant Limousine",
            "image": "/static/cars/cat_1_var_2_mod_1.png",
            "text": "Eine elegante Limousine für besondere Anlässe.",
            "description": "Die elegante Limousine bietet Luxus und Stil. Sie ist mit einem leistungsstarken Motor ausgestattet und bietet ein geräumiges Interieur mit hochwertigen Materialien. Ideal für besondere Anlässe oder Geschäftsreisen.",
            "price": "85.00 € per day",
            "seats": 5,
            "transmission": "Automatic"
        }
    ])
}

// ============================================================================
// Handlers
// ============================================================================

async fn get_available_locations(
    arguments: Value,
    context: ToolContext,
) -> Result<ToolResult, ToolError> {
    tracing::debug!(call_id = %context.call_id, arguments = %arguments, "Retrieving available locations");
    Ok(ToolResult::to_upstream(locations()))
}

async fn get_available_cars(arguments: Value, context: ToolContext) -> Result<ToolResult, ToolError> {
    tracing::debug!(call_id = %context.call_id, arguments = %arguments, "Retrieving available cars");
    Ok(ToolResult::to_upstream(cars()))
}

async fn show_model_information(
    arguments: Value,
    _context: ToolContext,
) -> Result<ToolResult, ToolError> {
    Ok(ToolResult::to_downstream(pick(
        &arguments,
        &["title", "text", "image"],
    )))
}

async fn show_final_details(arguments: Value, _context: ToolContext) -> Result<ToolResult, ToolError> {
    Ok(ToolResult::to_downstream(pick(
        &arguments,
        &["pickup_location", "car_model", "pickup_date", "return_date"],
    )))
}

pub(super) fn register(registry: &mut ToolRegistry) -> Result<(), ToolError> {
    registry.register(
        "get_available_locations",
        get_available_locations_schema(),
        get_available_locations,
    )?;
    registry.register(
        "get_available_cars",
        get_available_cars_schema(),
        get_available_cars,
    )?;
    registry.register(
        "show_model_information",
        show_model_information_schema(),
        show_model_information,
    )?;
    registry.register(
        "show_final_details",
        show_final_details_schema(),
        show_final_details,
    )?;
    Ok(())
}
