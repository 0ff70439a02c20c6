pub mod random;

pub mod neuron;
pub mod neuron_rules;
pub mod spike_responders;
pub mod synapse;

pub mod network;
pub mod snapshot;

pub mod connections;
pub mod groups;
pub mod layout;

pub mod linalg;
pub mod reservoir;

pub mod bptt;
pub mod competitive;
pub mod esn;
pub mod feed_forward;
pub mod hopfield;
pub mod som;
pub mod srn;

pub mod trainers;
