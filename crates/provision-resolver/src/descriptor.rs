//! Features descriptor parsing.
//!
//! Descriptors are XML documents rooted at `<features>`, either in one of the
//! `http://karaf.apache.org/xmlns/features/v1.x.0` namespaces or without a
//! namespace at all, or JSON documents of the same shape. Both are normalised
//! into the same [`Feature`] model. Any element the schema does not allow is a
//! validation error naming the descriptor URI.

use std::sync::Arc;
use roxmltree::{Document, Node};
use serde::Deserialize;

use provision_core::error::{ProvisionError, ProvisionResult};
use provision_core::feature::{
    BundleInfo, ConfigFileInfo, ConfigInfo, Conditional, Dependency, Feature, FeatureBuilder,
};
use provision_core::properties;

use crate::repository::Repository;

/// Namespace prefix shared by every supported schema version
pub const FEATURES_NAMESPACE_PREFIX: &str = "http://karaf.apache.org/xmlns/features/v1.";

/// Parse descriptor bytes fetched from `uri`
pub fn parse_descriptor(uri: &str, bytes: &[u8]) -> ProvisionResult<Repository> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ProvisionError::validation(uri, format!("descriptor is not valid UTF-8: {}", e)))?;

    let first = text.trim_start().chars().next();
    match first {
        Some('{') => parse_json(uri, text),
        Some('<') => parse_xml(uri, text),
        _ => Err(ProvisionError::validation(uri, "descriptor is neither XML nor JSON")),
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonDescriptor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "repository")]
    repositories: Vec<String>,
    #[serde(default, rename = "resource-repository")]
    resource_repositories: Vec<String>,
    #[serde(default, rename = "feature")]
    features: Vec<Feature>,
}

fn parse_json(uri: &str, text: &str) -> ProvisionResult<Repository> {
    let descriptor: JsonDescriptor =
        serde_json::from_str(text).map_err(|e| ProvisionError::validation(uri, e.to_string()))?;

    let mut features = Vec::with_capacity(descriptor.features.len());
    for feature in descriptor.features {
        if feature.name().trim().is_empty() {
            return Err(ProvisionError::validation(uri, "feature without a name"));
        }
        for bundle in feature.bundles() {
            if bundle.location.trim().is_empty() {
                return Err(ProvisionError::validation(
                    uri,
                    format!("feature {} has a bundle without a location", feature),
                ));
            }
        }
        features.push(Arc::new(feature));
    }

    Ok(Repository::new(
        uri,
        descriptor.name,
        features,
        descriptor.repositories,
        descriptor.resource_repositories,
    ))
}

fn parse_xml(uri: &str, text: &str) -> ProvisionResult<Repository> {
    let doc = Document::parse(text).map_err(|e| ProvisionError::validation(uri, e.to_string()))?;
    let root = doc.root_element();

    if root.tag_name().name() != "features" {
        return Err(ProvisionError::validation(
            uri,
            format!("expected root element 'features', found '{}'", root.tag_name().name()),
        ));
    }
    let namespace = root.tag_name().namespace();
    if let Some(ns) = namespace {
        if !ns.starts_with(FEATURES_NAMESPACE_PREFIX) {
            return Err(ProvisionError::validation(uri, format!("unsupported namespace '{}'", ns)));
        }
    }

    let ctx = XmlContext { uri, namespace };
    let mut features = Vec::new();
    let mut repositories = Vec::new();
    let mut resource_repositories = Vec::new();

    for child in ctx.elements(root)? {
        match child.tag_name().name() {
            "repository" => repositories.push(ctx.required_text(child)?),
            "resource-repository" => resource_repositories.push(ctx.required_text(child)?),
            "feature" => features.push(Arc::new(ctx.feature(child)?)),
            other => return Err(ctx.unexpected(other, "features")),
        }
    }

    Ok(Repository::new(
        uri,
        root.attribute("name").map(str::to_string),
        features,
        repositories,
        resource_repositories,
    ))
}

struct XmlContext<'a> {
    uri: &'a str,
    namespace: Option<&'a str>,
}

impl<'a> XmlContext<'a> {
    /// Element children of `node`, all required to share the document namespace
    fn elements<'d, 'i>(&self, node: Node<'d, 'i>) -> ProvisionResult<Vec<Node<'d, 'i>>> {
        let mut elements = Vec::new();
        for child in node.children().filter(|n| n.is_element()) {
            if child.tag_name().namespace() != self.namespace {
                return Err(ProvisionError::validation(
                    self.uri,
                    format!("element '{}' is not in the descriptor namespace", child.tag_name().name()),
                ));
            }
            elements.push(child);
        }
        Ok(elements)
    }

    fn unexpected(&self, element: &str, parent: &str) -> ProvisionError {
        ProvisionError::validation(
            self.uri,
            format!("invalid content: element '{}' is not allowed in '{}'", element, parent),
        )
    }

    fn text(&self, node: Node) -> String {
        node.text().unwrap_or_default().trim().to_string()
    }

    fn required_text(&self, node: Node) -> ProvisionResult<String> {
        let text = self.text(node);
        if text.is_empty() {
            return Err(ProvisionError::validation(
                self.uri,
                format!("element '{}' must not be empty", node.tag_name().name()),
            ));
        }
        Ok(text)
    }

    fn bool_attr(&self, node: Node, name: &str, default: bool) -> ProvisionResult<bool> {
        match node.attribute(name).map(str::trim) {
            None => Ok(default),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(ProvisionError::validation(
                self.uri,
                format!("attribute '{}' must be true or false, found '{}'", name, other),
            )),
        }
    }

    fn u32_attr(&self, node: Node, name: &str) -> ProvisionResult<u32> {
        match node.attribute(name).map(str::trim) {
            None | Some("") => Ok(0),
            Some(raw) => raw.parse().map_err(|_| {
                ProvisionError::validation(self.uri, format!("attribute '{}' must be a number, found '{}'", name, raw))
            }),
        }
    }

    fn feature(&self, node: Node) -> ProvisionResult<Feature> {
        let name = node
            .attribute("name")
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ProvisionError::validation(self.uri, "attribute 'name' is required on 'feature'"))?;

        let mut builder = FeatureBuilder::new(name)
            .version(node.attribute("version").unwrap_or_default().trim())
            .start_level(self.u32_attr(node, "start-level")?);
        if let Some(description) = node.attribute("description") {
            builder = builder.description(description);
        }
        if let Some(region) = node.attribute("region") {
            builder = builder.region(region);
        }

        for child in self.elements(node)? {
            builder = match child.tag_name().name() {
                "details" => builder.description(self.text(child)),
                "bundle" => builder.bundle(self.bundle(child)?),
                "feature" => builder.dependency(self.dependency(child)?),
                "config" => builder.config(self.config(child)?),
                "configfile" => builder.config_file(self.config_file(child)?),
                "conditional" => builder.conditional(self.conditional(child)?),
                "capability" => builder.capability(self.required_text(child)?),
                "requirement" => builder.requirement(self.required_text(child)?),
                other => return Err(self.unexpected(other, "feature")),
            };
        }

        builder.build().map_err(|e| ProvisionError::validation(self.uri, e.to_string()))
    }

    fn bundle(&self, node: Node) -> ProvisionResult<BundleInfo> {
        Ok(BundleInfo {
            location: self.required_text(node)?,
            start_level: self.u32_attr(node, "start-level")?,
            start: self.bool_attr(node, "start", true)?,
            dependency: self.bool_attr(node, "dependency", false)?,
        })
    }

    fn dependency(&self, node: Node) -> ProvisionResult<Dependency> {
        Ok(Dependency::new(
            self.required_text(node)?,
            node.attribute("version").unwrap_or_default().trim(),
        ))
    }

    fn config(&self, node: Node) -> ProvisionResult<ConfigInfo> {
        let name = node
            .attribute("name")
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ProvisionError::validation(self.uri, "attribute 'name' is required on 'config'"))?;
        let props = properties::parse(node.text().unwrap_or_default());
        let mut config = ConfigInfo::new(name, props);
        config.append = self.bool_attr(node, "append", false)?;
        config.override_existing = self.bool_attr(node, "override", false)?;
        Ok(config)
    }

    fn config_file(&self, node: Node) -> ProvisionResult<ConfigFileInfo> {
        let finalname = node
            .attribute("finalname")
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ProvisionError::validation(self.uri, "attribute 'finalname' is required on 'configfile'"))?;
        Ok(ConfigFileInfo {
            location: self.required_text(node)?,
            finalname: finalname.to_string(),
            override_existing: self.bool_attr(node, "override", false)?,
        })
    }

    fn conditional(&self, node: Node) -> ProvisionResult<Conditional> {
        let mut conditional = Conditional::default();
        for child in self.elements(node)? {
            match child.tag_name().name() {
                "condition" => conditional.condition.push(self.required_text(child)?),
                "bundle" => conditional.bundles.push(self.bundle(child)?),
                "feature" => conditional.dependencies.push(self.dependency(child)?),
                "config" => conditional.configs.push(self.config(child)?),
                "configfile" => conditional.config_files.push(self.config_file(child)?),
                other => return Err(self.unexpected(other, "conditional")),
            }
        }
        if conditional.condition.is_empty() {
            return Err(ProvisionError::validation(self.uri, "conditional without a condition"));
        }
        Ok(conditional)
    }
}
