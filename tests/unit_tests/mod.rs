mod comm;
mod io;
mod mesh;
mod scatter;
mod topology;
