pub mod bus_state;
