//! OpenAPI documentation
//!
//! Provides the OpenAPI 3.0 document and a Swagger UI page for the admin API.

use axum::{
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

/// Create OpenAPI routes
pub fn create_openapi_routes() -> Router {
    Router::new()
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
}

async fn openapi_json() -> impl IntoResponse {
    Json(get_openapi_spec())
}

async fn swagger_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

fn json_response(description: &str, schema: &str) -> Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": {"$ref": format!("#/components/schemas/{}", schema)}
            }
        }
    })
}

fn error_response(description: &str) -> Value {
    json_response(description, "Error")
}

fn uuid_param(name: &str) -> Value {
    json!({"name": name, "in": "path", "required": true, "schema": {"type": "string", "format": "uuid"}})
}

fn query_param(name: &str, schema: Value, description: &str) -> Value {
    json!({"name": name, "in": "query", "required": false, "schema": schema, "description": description})
}

/// Get the OpenAPI specification as JSON
pub fn get_openapi_spec() -> Value {
    let page = query_param("page", json!({"type": "integer", "minimum": 1, "default": 1}), "Page number");
    let page_size = query_param(
        "pageSize",
        json!({"type": "integer", "minimum": 1, "maximum": 100, "default": 20}),
        "Items per page",
    );

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "BotSentry Admin API",
            "description": "Admin API for bot email security\n\n## Authentication\n\nAll `/api/v1/admin/security` endpoints require an admin API key with the `admin:security` scope, except that the approve endpoint also accepts the one-time token from the alert email.\n\n- **Header**: `X-API-Key: <your-api-key>`\n- **Bearer**: `Authorization: Bearer <your-api-key>`",
            "version": "1.0.0",
            "license": {
                "name": "Apache-2.0",
                "url": "https://www.apache.org/licenses/LICENSE-2.0"
            }
        },
        "tags": [
            {"name": "health", "description": "Health and metrics"},
            {"name": "review", "description": "Daily content review"},
            {"name": "bulk-signups", "description": "Bulk signup alerts"}
        ],
        "security": [{"api_key": []}, {"bearer": []}],
        "paths": {
            "/health": {
                "get": {
                    "tags": ["health"],
                    "summary": "Basic health check",
                    "security": [],
                    "responses": {"200": json_response("Service is healthy", "HealthResponse")}
                }
            },
            "/health/ready": {
                "get": {
                    "tags": ["health"],
                    "summary": "Readiness check",
                    "security": [],
                    "responses": {
                        "200": {"description": "Database reachable"},
                        "503": {"description": "Database unreachable"}
                    }
                }
            },
            "/metrics": {
                "get": {
                    "tags": ["health"],
                    "summary": "Prometheus metrics",
                    "security": [],
                    "responses": {"200": {"description": "Metrics in text exposition format"}}
                }
            },
            "/api/v1/admin/security/stats": {
                "get": {
                    "tags": ["review"],
                    "summary": "Bot counts per status, total flags and the last 7 reports",
                    "responses": {
                        "200": json_response("Stats", "SecurityStats"),
                        "401": error_response("Missing or invalid API key"),
                        "403": error_response("Missing scope")
                    }
                }
            },
            "/api/v1/admin/security/reports": {
                "get": {
                    "tags": ["review"],
                    "summary": "List daily reports, newest first",
                    "parameters": [query_param("limit", json!({"type": "integer", "default": 30}), "Maximum number of reports")],
                    "responses": {
                        "200": {
                            "description": "Reports",
                            "content": {"application/json": {"schema": {"type": "array", "items": {"$ref": "#/components/schemas/SecurityReport"}}}}
                        }
                    }
                }
            },
            "/api/v1/admin/security/reports/{date}": {
                "get": {
                    "tags": ["review"],
                    "summary": "Get the report for a date",
                    "parameters": [{"name": "date", "in": "path", "required": true, "schema": {"type": "string", "format": "date"}}],
                    "responses": {
                        "200": json_response("Report", "SecurityReport"),
                        "400": error_response("Invalid date"),
                        "404": error_response("No report for this date")
                    }
                }
            },
            "/api/v1/admin/security/flagged-bots": {
                "get": {
                    "tags": ["review"],
                    "summary": "List bots in a restricted status",
                    "parameters": [
                        query_param("status", json!({"type": "string", "enum": ["flagged", "under_review", "suspended"]}), "Filter by status; all restricted statuses when omitted"),
                        page,
                        page_size
                    ],
                    "responses": {
                        "200": {"description": "Paginated bots"},
                        "400": error_response("Invalid status or pagination")
                    }
                }
            },
            "/api/v1/admin/security/flags/{bot_id}": {
                "get": {
                    "tags": ["review"],
                    "summary": "Flag history of a bot, newest first",
                    "parameters": [uuid_param("bot_id")],
                    "responses": {
                        "200": {"description": "Bot and its flags"},
                        "404": error_response("Bot not found")
                    }
                }
            },
            "/api/v1/admin/security/force-review": {
                "post": {
                    "tags": ["review"],
                    "summary": "Run the daily review now",
                    "parameters": [query_param("date", json!({"type": "string", "format": "date"}), "Day to review; yesterday (UTC) when omitted")],
                    "responses": {
                        "200": json_response("Review summary", "ReviewSummary"),
                        "400": error_response("Invalid date")
                    }
                }
            },
            "/api/v1/admin/security/bulk-signups": {
                "get": {
                    "tags": ["bulk-signups"],
                    "summary": "List bulk signup alerts",
                    "parameters": [
                        query_param("status", json!({"type": "string", "enum": ["pending", "approved", "ignored"]}), "Filter by status"),
                        page.clone(),
                        page_size.clone()
                    ],
                    "responses": {
                        "200": {"description": "Paginated alerts"},
                        "400": error_response("Invalid status or pagination")
                    }
                }
            },
            "/api/v1/admin/security/bulk-signups/force-scan": {
                "post": {
                    "tags": ["bulk-signups"],
                    "summary": "Run bulk signup detection now",
                    "responses": {"200": json_response("Detection summary", "DetectionSummary")}
                }
            },
            "/api/v1/admin/security/bulk-signups/{id}": {
                "get": {
                    "tags": ["bulk-signups"],
                    "summary": "Alert with its bots and related IP blocks",
                    "parameters": [uuid_param("id")],
                    "responses": {
                        "200": {"description": "Alert detail"},
                        "404": error_response("Alert not found")
                    }
                }
            },
            "/api/v1/admin/security/bulk-signups/{id}/approve": {
                "post": {
                    "tags": ["bulk-signups"],
                    "summary": "Suspend the cluster's bots and block its IPs",
                    "description": "Authorized by an admin API key or the `token` from the alert email. Responds with JSON when the caller is an admin or sends a JSON `Accept`/`Content-Type`, otherwise with an HTML page.",
                    "security": [{"api_key": []}, {"bearer": []}, {}],
                    "parameters": [uuid_param("id"), query_param("token", json!({"type": "string"}), "One-time approval token")],
                    "responses": {
                        "200": json_response("Approval summary", "ApprovalResponse"),
                        "401": error_response("No credentials"),
                        "403": error_response("Invalid token"),
                        "404": error_response("Alert not found"),
                        "409": error_response("Alert already approved or ignored")
                    }
                },
                "get": {
                    "tags": ["bulk-signups"],
                    "summary": "Email link variant of approve",
                    "security": [{}],
                    "parameters": [uuid_param("id"), query_param("token", json!({"type": "string"}), "One-time approval token")],
                    "responses": {"200": {"description": "HTML confirmation page"}}
                }
            },
            "/api/v1/admin/security/bulk-signups/{id}/ignore": {
                "post": {
                    "tags": ["bulk-signups"],
                    "summary": "Close an alert without action",
                    "parameters": [uuid_param("id")],
                    "responses": {
                        "200": {"description": "Alert ignored"},
                        "404": error_response("Alert not found"),
                        "409": error_response("Alert already approved or ignored")
                    }
                }
            }
        },
        "components": {
            "securitySchemes": {
                "api_key": {"type": "apiKey", "in": "header", "name": "X-API-Key"},
                "bearer": {"type": "http", "scheme": "bearer"}
            },
            "schemas": {
                "Error": {
                    "type": "object",
                    "properties": {
                        "error": {"type": "string", "example": "NOT_FOUND"},
                        "message": {"type": "string"}
                    }
                },
                "HealthResponse": {
                    "type": "object",
                    "properties": {"status": {"type": "string", "example": "healthy"}}
                },
                "SecurityStats": {
                    "type": "object",
                    "properties": {
                        "botsByStatus": {"type": "object", "additionalProperties": {"type": "integer"}},
                        "totalFlags": {"type": "integer"},
                        "recentReports": {"type": "array", "items": {"$ref": "#/components/schemas/SecurityReport"}}
                    }
                },
                "SecurityReport": {
                    "type": "object",
                    "properties": {
                        "reportDate": {"type": "string", "format": "date"},
                        "stats": {
                            "type": "object",
                            "properties": {
                                "emailsInbound": {"type": "integer"},
                                "emailsOutbound": {"type": "integer"},
                                "newBots": {"type": "integer"},
                                "claimedBots": {"type": "integer"}
                            }
                        },
                        "flaggedEmails": {"type": "array", "items": {"type": "object"}},
                        "subjects": {"type": "array", "items": {"type": "string"}},
                        "sentToAdmin": {"type": "boolean"}
                    }
                },
                "ReviewSummary": {
                    "type": "object",
                    "properties": {
                        "date": {"type": "string", "format": "date"},
                        "outboundMessages": {"type": "integer"},
                        "verdicts": {"type": "integer"},
                        "flagsCreated": {"type": "integer"},
                        "duplicatesSkipped": {"type": "integer"},
                        "statusChanges": {"type": "integer"},
                        "reportSent": {"type": "boolean"},
                        "classifierError": {"type": "string"}
                    }
                },
                "DetectionSummary": {
                    "type": "object",
                    "properties": {
                        "botsScanned": {"type": "integer"},
                        "clustersFound": {"type": "integer"},
                        "alertsCreated": {"type": "array", "items": {"type": "string", "format": "uuid"}},
                        "duplicatesSkipped": {"type": "integer"},
                        "emailsSent": {"type": "integer"}
                    }
                },
                "ApprovalResponse": {
                    "type": "object",
                    "properties": {
                        "alertId": {"type": "string", "format": "uuid"},
                        "status": {"type": "string", "example": "approved"},
                        "summary": {
                            "type": "object",
                            "properties": {
                                "botsSuspended": {"type": "integer"},
                                "handlesDeleted": {"type": "integer"},
                                "ipBlocksCreated": {"type": "integer"},
                                "ipBlocksExtended": {"type": "integer"},
                                "blockedUntil": {"type": "string", "format": "date-time"}
                            }
                        }
                    }
                }
            }
        }
    })
}

const SWAGGER_UI_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>BotSentry API Documentation</title>
    <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui.css" />
    <style>
        body { margin: 0; padding: 0; }
        .swagger-ui .topbar { display: none; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui-bundle.js"></script>
    <script>
        window.onload = function() {
            SwaggerUIBundle({
                url: "/openapi.json",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIBundle.SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>"#;
