/*
 * This module defines the record types shared by every stage of the engine:
 * nodes, links, routing observations and timestamps.
 * It also provides the petgraph view of a topology handed to renderers.
 */

pub mod link;
pub mod network_graph;
pub mod node;
pub mod routing;
pub mod time;
