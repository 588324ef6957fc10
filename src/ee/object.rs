use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

use super::expression::Expression;
use crate::error::{Result, UsageError};

/// What an Earth Engine expression evaluates to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EeKind {
    Image,
    ImageCollection,
    Feature,
    FeatureCollection,
    Geometry,
    Other(String),
}

impl EeKind {
    pub fn as_str(&self) -> &str {
        match self {
            EeKind::Image => "Image",
            EeKind::ImageCollection => "ImageCollection",
            EeKind::Feature => "Feature",
            EeKind::FeatureCollection => "FeatureCollection",
            EeKind::Geometry => "Geometry",
            EeKind::Other(name) => name,
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(
            self,
            EeKind::Feature | EeKind::FeatureCollection | EeKind::Geometry
        )
    }

    pub fn is_raster(&self) -> bool {
        matches!(self, EeKind::Image | EeKind::ImageCollection)
    }
}

impl From<String> for EeKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "Image" => EeKind::Image,
            "ImageCollection" => EeKind::ImageCollection,
            "Feature" => EeKind::Feature,
            "FeatureCollection" => EeKind::FeatureCollection,
            "Geometry" => EeKind::Geometry,
            _ => EeKind::Other(name),
        }
    }
}

impl From<EeKind> for String {
    fn from(kind: EeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a remote Earth Engine value: an expression plus its type.
#[derive(Debug, Clone, PartialEq)]
pub struct EeObject {
    kind: EeKind,
    expression: Expression,
}

impl EeObject {
    pub fn new(kind: EeKind, expression: Expression) -> Self {
        Self { kind, expression }
    }

    pub fn image(asset_id: &str) -> Self {
        Self::load(EeKind::Image, "Image.load", "id", asset_id)
    }

    pub fn image_collection(asset_id: &str) -> Self {
        Self::load(EeKind::ImageCollection, "ImageCollection.load", "id", asset_id)
    }

    pub fn feature_collection(table_id: &str) -> Self {
        Self::load(EeKind::FeatureCollection, "Collection.loadTable", "tableId", table_id)
    }

    /// Loads an asset by id. Only images, image collections and tables are stored as assets.
    pub fn asset(kind: EeKind, asset_id: &str) -> Result<Self> {
        match kind {
            EeKind::Image => Ok(Self::image(asset_id)),
            EeKind::ImageCollection => Ok(Self::image_collection(asset_id)),
            EeKind::FeatureCollection => Ok(Self::feature_collection(asset_id)),
            other => Err(UsageError::UnsupportedSource(format!(
                "asset '{asset_id}' of kind {other}"
            ))
            .into()),
        }
    }

    fn load(kind: EeKind, function: &str, argument: &str, asset_id: &str) -> Self {
        let expression = Expression::invoke(
            function,
            vec![(argument, Expression::constant(json!(asset_id)))],
        );
        Self { kind, expression }
    }

    pub fn kind(&self) -> &EeKind {
        &self.kind
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// The object as a feature collection expression. Only vector kinds qualify.
    pub fn as_collection(&self) -> Result<Expression> {
        match self.kind {
            EeKind::FeatureCollection => Ok(self.expression.clone()),
            EeKind::Feature => Ok(collection_of(vec![self.expression.clone()])),
            EeKind::Geometry => {
                let feature = Expression::invoke("Feature", vec![("geometry", self.expression.clone())]);
                Ok(collection_of(vec![feature]))
            }
            _ => Err(UsageError::UnsupportedSource(format!(
                "Earth Engine {} where a vector object was expected",
                self.kind
            ))
            .into()),
        }
    }

    /// Number of features for a collection built from literal features.
    pub fn literal_feature_count(&self) -> Option<usize> {
        if self.kind != EeKind::FeatureCollection || self.expression.function_name() != Some("Collection") {
            return None;
        }
        self.expression
            .argument("features")?
            .get("arrayValue")?
            .get("values")?
            .as_array()
            .map(Vec::len)
    }
}

/// `Collection(features)` over literal feature expressions.
pub fn collection_of(features: Vec<Expression>) -> Expression {
    Expression::invoke("Collection", vec![("features", Expression::array(features))])
}
